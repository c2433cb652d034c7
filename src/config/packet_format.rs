//! Packet format configuration
//!
//! A packet format describes how to carve packets out of the byte stream.
//! It is loaded from JSON, validated once, and is immutable afterwards:
//!
//! ```json
//! {
//!   "packet_title": "Type 0 Example",
//!   "packet_format": {
//!     "type": 0,
//!     "packet_delimiters": ["\n", "\t"],
//!     "data_delimiters": ["="],
//!     "packet_ids": ["output"],
//!     "ignore": ["\r", " "],
//!     "graph_definitions": {
//!       "output": { "title": "Output", "x": { "use_time": true } }
//!     }
//!   }
//! }
//! ```
//!
//! The four format kinds map onto the closed [`PacketFormat`] enum. Every
//! field required by the selected kind is checked at load time and reported
//! as [`CaptureError::InvalidConfig`]; nothing about the format can fail
//! later while parsing.

use crate::error::{CaptureError, Result, ResultExt};
use crate::types::SeriesKey;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Widest kind 2 field, in hex digits, that fits a `u128`
pub const MAX_HEX_FIELD_DIGITS: u32 = 32;

/// Widest kind 3 field, in bits, that fits a `u128`
pub const MAX_BIT_FIELD_BITS: u32 = 128;

// ==================== Delimiters ====================

/// A compiled union of literal delimiter tokens
///
/// Splitting works on raw bytes so a multi-byte character cut in half at the
/// end of a read is never mangled.
#[derive(Debug, Clone)]
pub struct Delimiters {
    tokens: Vec<String>,
    regex: Regex,
}

impl Delimiters {
    /// Compile a delimiter set. `field` names the config field for errors.
    pub fn new(field: &str, tokens: &[String]) -> Result<Self> {
        if tokens.is_empty() {
            return Err(CaptureError::invalid_config(field, "must list at least one delimiter"));
        }
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(CaptureError::invalid_config(field, "delimiters must not be empty strings"));
        }
        let pattern = tokens
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&pattern)
            .map_err(|e| CaptureError::invalid_config(field, e.to_string()))?;
        Ok(Self {
            tokens: tokens.to_vec(),
            regex,
        })
    }

    /// The literal tokens, in configured order
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The first configured token
    pub fn first(&self) -> &str {
        &self.tokens[0]
    }

    /// Split `bytes` on every delimiter occurrence (leftmost-first).
    ///
    /// Always returns at least one segment; the last one is whatever follows
    /// the final delimiter, possibly empty.
    pub fn split<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        self.regex.split(bytes).collect()
    }

    /// Split off every segment that is terminated by a delimiter.
    ///
    /// Returns those segments and the number of bytes they span, including
    /// the final delimiter. Whatever follows the final delimiter is not a
    /// complete segment and is left for the caller to keep buffered.
    pub fn split_terminated<'a>(&self, bytes: &'a [u8]) -> (Vec<&'a [u8]>, usize) {
        let mut segments = Vec::new();
        let mut start = 0;
        for m in self.regex.find_iter(bytes) {
            segments.push(&bytes[start..m.start()]);
            start = m.end();
        }
        (segments, start)
    }
}

// ==================== Graph Definitions ====================

/// Axis block inside a graph definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisDefinition {
    /// Use arrival time for this axis
    #[serde(default)]
    pub use_time: Option<bool>,

    /// Take this axis from another series
    #[serde(default)]
    pub packet_id: Option<String>,

    /// Axis label
    #[serde(default, alias = "x_axis", alias = "y_axis")]
    pub label: Option<String>,
}

/// Display hints for one series
///
/// Rendering is out of scope; the x-axis block is still consumed because it
/// decides how packet ids are keyed in the store (see [`IdMapping`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub x_axis: Option<String>,

    #[serde(default)]
    pub y_axis: Option<String>,

    #[serde(default)]
    pub x: Option<AxisDefinition>,

    #[serde(default)]
    pub y: Option<AxisDefinition>,
}

/// How a series' packet ids are keyed when inserted into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdMapping {
    /// Keep the parser's nanosecond timestamp
    Timestamp,
    /// Number packets 0, 1, 2, ... within the series
    Sequence,
    /// Use the latest value of the named series
    Series(String),
}

impl GraphDefinition {
    /// Id mapping selected by the x-axis block
    pub fn id_mapping(&self) -> IdMapping {
        match &self.x {
            None => IdMapping::Timestamp,
            Some(x) => match (&x.packet_id, x.use_time) {
                (Some(other), _) => IdMapping::Series(other.clone()),
                (None, Some(false)) => IdMapping::Sequence,
                (None, _) => IdMapping::Timestamp,
            },
        }
    }
}

// ==================== Packet Formats ====================

/// Kind 0: delimited, single token per packet
#[derive(Debug, Clone)]
pub struct DelimitedFormat {
    pub packet_delimiters: Delimiters,
    pub data_delimiters: Delimiters,
    pub packet_ids: Vec<String>,
    pub ignore: Vec<String>,
}

/// Kind 1: delimited, id and data arriving as specifier-tagged pairs
#[derive(Debug, Clone)]
pub struct PairedFormat {
    pub packet_delimiters: Delimiters,
    pub data_delimiters: Delimiters,
    pub packet_ids: Vec<String>,
    /// Token marking the id half of a pair
    pub id_specifier: String,
    /// Token marking the data half of a pair
    pub data_specifier: String,
}

/// Kinds 2 and 3: fixed-width frames
///
/// For kind 2 `header_len` counts hex digit characters, for kind 3 bits.
/// The first field is the packet id and the second is the value; any further
/// fields are decoded and checked but not reported.
#[derive(Debug, Clone)]
pub struct FrameFormat {
    pub header_order: Vec<String>,
    pub header_len: Vec<u32>,
    /// Ids as configured
    pub packet_ids: Vec<String>,
    /// Ids parsed in the kind's radix
    pub id_values: Vec<u128>,
}

impl FrameFormat {
    /// Sum of all field widths
    pub fn total_len(&self) -> usize {
        self.header_len.iter().map(|&l| l as usize).sum()
    }

    /// Whether the first field matches a whitelisted id
    pub fn accepts(&self, id: u128) -> bool {
        self.id_values.contains(&id)
    }
}

/// The four supported framing strategies
#[derive(Debug, Clone)]
pub enum PacketFormat {
    /// Kind 0
    Delimited(DelimitedFormat),
    /// Kind 1
    Paired(PairedFormat),
    /// Kind 2
    HexFrame(FrameFormat),
    /// Kind 3
    BitFrame(FrameFormat),
}

impl PacketFormat {
    /// Numeric kind as written in the JSON `type` field
    pub fn kind(&self) -> u8 {
        match self {
            PacketFormat::Delimited(_) => 0,
            PacketFormat::Paired(_) => 1,
            PacketFormat::HexFrame(_) => 2,
            PacketFormat::BitFrame(_) => 3,
        }
    }

    /// Human-readable kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            PacketFormat::Delimited(_) => "delimited",
            PacketFormat::Paired(_) => "specifier-paired",
            PacketFormat::HexFrame(_) => "fixed-width hex",
            PacketFormat::BitFrame(_) => "fixed-width bit-packed",
        }
    }

    /// Radix used to read binary packet ids, if this is a binary kind
    fn id_radix(&self) -> Option<u32> {
        match self {
            PacketFormat::HexFrame(_) => Some(16),
            PacketFormat::BitFrame(_) => Some(2),
            _ => None,
        }
    }
}

// ==================== Packet Config ====================

/// Validated packet configuration
#[derive(Debug, Clone)]
pub struct PacketConfig {
    pub title: String,
    pub description: Option<String>,
    pub example_line: Option<String>,
    pub format: PacketFormat,
    pub graph_definitions: BTreeMap<String, GraphDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawPacketConfig {
    #[serde(default)]
    packet_title: Option<String>,
    #[serde(default)]
    packet_description: Option<String>,
    #[serde(default)]
    example_line: Option<String>,
    #[serde(default)]
    packet_format: Option<RawPacketFormat>,
}

#[derive(Debug, Deserialize)]
struct RawPacketFormat {
    #[serde(rename = "type")]
    kind: Option<i64>,
    packet_delimiters: Option<Vec<String>>,
    data_delimiters: Option<Vec<String>>,
    packet_ids: Option<Vec<String>>,
    ignore: Option<Vec<String>>,
    specifiers: Option<Vec<String>>,
    header_order: Option<Vec<String>>,
    header_len: Option<Vec<u32>>,
    #[serde(default)]
    graph_definitions: BTreeMap<String, GraphDefinition>,
}

fn required<T>(value: Option<T>, field: &str, kind: i64) -> Result<T> {
    value.ok_or_else(|| {
        CaptureError::invalid_config(field, format!("required for packet type {}", kind))
    })
}

/// Parse a configured id in the given radix, accepting `0x`/`0b` prefixes
/// and `_` separators.
pub fn parse_id(text: &str, radix: u32) -> Option<u128> {
    let trimmed = text.trim();
    let body = match radix {
        16 => trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed),
        2 => trimmed
            .strip_prefix("0b")
            .or_else(|| trimmed.strip_prefix("0B"))
            .unwrap_or(trimmed),
        _ => trimmed,
    };
    let digits: String = body.chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return None;
    }
    u128::from_str_radix(&digits, radix).ok()
}

fn frame_format(raw: RawPacketFormat, kind: i64, radix: u32, max_width: u32) -> Result<FrameFormat> {
    let header_order = required(raw.header_order, "header_order", kind)?;
    let header_len = required(raw.header_len, "header_len", kind)?;
    let packet_ids = required(raw.packet_ids, "packet_ids", kind)?;

    if header_order.len() < 2 {
        return Err(CaptureError::invalid_config(
            "header_order",
            "must name an id field followed by a value field",
        ));
    }
    if header_order.len() != header_len.len() {
        return Err(CaptureError::invalid_config(
            "header_len",
            format!(
                "has {} entries but header_order has {}",
                header_len.len(),
                header_order.len()
            ),
        ));
    }
    if let Some(bad) = header_len.iter().find(|&&l| l == 0 || l > max_width) {
        return Err(CaptureError::invalid_config(
            "header_len",
            format!("field width {} is outside 1..={}", bad, max_width),
        ));
    }

    let id_values = packet_ids
        .iter()
        .map(|id| {
            parse_id(id, radix).ok_or_else(|| {
                CaptureError::invalid_config(
                    "packet_ids",
                    format!("`{}` is not a base-{} number", id, radix),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FrameFormat {
        header_order,
        header_len,
        packet_ids,
        id_values,
    })
}

impl PacketConfig {
    /// Load and validate a packet config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read packet config {:?}", path))?;
        let config = Self::from_json_str(&content)?;
        tracing::info!(
            "Loaded packet config '{}' (type {}) from {:?}",
            config.title,
            config.format.kind(),
            path
        );
        Ok(config)
    }

    /// Parse and validate a packet config from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawPacketConfig = serde_json::from_str(json)
            .map_err(|e| CaptureError::invalid_config("json", e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Parse and validate a packet config from a JSON value
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawPacketConfig = serde_json::from_value(value)
            .map_err(|e| CaptureError::invalid_config("json", e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPacketConfig) -> Result<Self> {
        let mut fmt = raw
            .packet_format
            .ok_or_else(|| CaptureError::invalid_config("packet_format", "missing"))?;
        let kind = fmt
            .kind
            .ok_or_else(|| CaptureError::invalid_config("type", "missing"))?;
        let graph_definitions = std::mem::take(&mut fmt.graph_definitions);

        let format = match kind {
            0 => PacketFormat::Delimited(DelimitedFormat {
                packet_delimiters: Delimiters::new(
                    "packet_delimiters",
                    &required(fmt.packet_delimiters, "packet_delimiters", kind)?,
                )?,
                data_delimiters: Delimiters::new(
                    "data_delimiters",
                    &required(fmt.data_delimiters, "data_delimiters", kind)?,
                )?,
                packet_ids: required(fmt.packet_ids, "packet_ids", kind)?,
                ignore: fmt.ignore.unwrap_or_default(),
            }),
            1 => {
                let specifiers = required(fmt.specifiers, "specifiers", kind)?;
                let [id_specifier, data_specifier]: [String; 2] =
                    specifiers.try_into().map_err(|s: Vec<String>| {
                        CaptureError::invalid_config(
                            "specifiers",
                            format!("expected exactly 2 tokens, got {}", s.len()),
                        )
                    })?;
                PacketFormat::Paired(PairedFormat {
                    packet_delimiters: Delimiters::new(
                        "packet_delimiters",
                        &required(fmt.packet_delimiters, "packet_delimiters", kind)?,
                    )?,
                    data_delimiters: Delimiters::new(
                        "data_delimiters",
                        &required(fmt.data_delimiters, "data_delimiters", kind)?,
                    )?,
                    packet_ids: required(fmt.packet_ids, "packet_ids", kind)?,
                    id_specifier,
                    data_specifier,
                })
            }
            2 => PacketFormat::HexFrame(frame_format(fmt, kind, 16, MAX_HEX_FIELD_DIGITS)?),
            3 => PacketFormat::BitFrame(frame_format(fmt, kind, 2, MAX_BIT_FIELD_BITS)?),
            other => {
                return Err(CaptureError::invalid_config(
                    "type",
                    format!("{} is not a supported packet type", other),
                ))
            }
        };

        Ok(Self {
            title: raw.packet_title.unwrap_or_default(),
            description: raw.packet_description,
            example_line: raw.example_line,
            format,
            graph_definitions,
        })
    }

    /// Numeric kind of the format
    pub fn kind(&self) -> u8 {
        self.format.kind()
    }

    /// Resolve a series name as written in the config into a [`SeriesKey`]
    ///
    /// Binary kinds key their series by integer id, so `"0x432"` becomes
    /// `SeriesKey::Int(0x432)` for kind 2.
    pub fn series_key(&self, name: &str) -> Option<SeriesKey> {
        match self.format.id_radix() {
            Some(radix) => parse_id(name, radix).map(SeriesKey::Int),
            None => Some(SeriesKey::text(name)),
        }
    }

    /// Graph definition for a series, matching integer series against
    /// definitions keyed by their configured id spelling.
    pub fn graph_definition(&self, series: &SeriesKey) -> Option<&GraphDefinition> {
        match series {
            SeriesKey::Text(name) => self.graph_definitions.get(name),
            SeriesKey::Int(_) => self
                .graph_definitions
                .iter()
                .find(|(name, _)| self.series_key(name).as_ref() == Some(series))
                .map(|(_, def)| def),
        }
    }

    /// Id mapping for a series (timestamp when the series has no definition)
    pub fn id_mapping(&self, series: &SeriesKey) -> IdMapping {
        self.graph_definition(series)
            .map(GraphDefinition::id_mapping)
            .unwrap_or(IdMapping::Timestamp)
    }
}
