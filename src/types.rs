//! Core data types for serial-capture
//!
//! This module contains the fundamental records produced by the parser and
//! held by the packet store.
//!
//! # Main Types
//!
//! - [`Packet`] - One decoded record (plaintext, series, id, value)
//! - [`SeriesKey`] - The logical channel a packet belongs to
//! - [`PacketValue`] - The payload of a packet
//! - [`PacketId`] - Ordered key distinguishing packets within a series
//! - [`ConnectionStatus`] - Orchestrator-side view of the serial connection
//!
//! Character formats (kinds 0 and 1) produce text series and values; binary
//! formats (kinds 2 and 3) produce integers.

use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Series used for packets produced without a packet format
pub const DEFAULT_SERIES: &str = "default";

/// The logical channel/source a packet belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum SeriesKey {
    /// Text token, used by character formats
    Text(String),
    /// Integer id, used by binary formats
    Int(u128),
}

impl SeriesKey {
    /// Build a text series key
    pub fn text(s: impl Into<String>) -> Self {
        SeriesKey::Text(s.into())
    }

    /// The text form if this is a text key
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SeriesKey::Text(s) => Some(s),
            SeriesKey::Int(_) => None,
        }
    }

    /// The integer form if this is an integer key
    pub fn as_int(&self) -> Option<u128> {
        match self {
            SeriesKey::Text(_) => None,
            SeriesKey::Int(v) => Some(*v),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKey::Text(s) => write!(f, "{}", s),
            SeriesKey::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for SeriesKey {
    fn from(s: &str) -> Self {
        SeriesKey::Text(s.to_string())
    }
}

impl From<String> for SeriesKey {
    fn from(s: String) -> Self {
        SeriesKey::Text(s)
    }
}

impl From<u128> for SeriesKey {
    fn from(v: u128) -> Self {
        SeriesKey::Int(v)
    }
}

/// The payload of a packet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PacketValue {
    /// Text payload (character formats)
    Text(String),
    /// Integer payload (binary formats, and the no-format fallback)
    Int(u128),
}

impl PacketValue {
    /// The integer form if this is an integer value
    pub fn as_int(&self) -> Option<u128> {
        match self {
            PacketValue::Text(_) => None,
            PacketValue::Int(v) => Some(*v),
        }
    }

    /// The text form if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PacketValue::Text(s) => Some(s),
            PacketValue::Int(_) => None,
        }
    }
}

impl fmt::Display for PacketValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketValue::Text(s) => write!(f, "{}", s),
            PacketValue::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for PacketValue {
    fn from(s: &str) -> Self {
        PacketValue::Text(s.to_string())
    }
}

impl From<String> for PacketValue {
    fn from(s: String) -> Self {
        PacketValue::Text(s)
    }
}

impl From<u128> for PacketValue {
    fn from(v: u128) -> Self {
        PacketValue::Int(v)
    }
}

/// Ordered key distinguishing packets within a series
///
/// The parser always mints [`PacketId::Timestamp`]. On ingest the store may
/// remap a packet's id to a sequence index or to another series' latest
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PacketId {
    /// Wall-clock nanoseconds since the Unix epoch
    Timestamp(u128),
    /// Position within the series
    Index(u64),
    /// Latest value of another series
    Value(PacketValue),
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketId::Timestamp(ns) => write!(f, "{}", ns),
            PacketId::Index(i) => write!(f, "{}", i),
            PacketId::Value(v) => write!(f, "{}", v),
        }
    }
}

/// One decoded record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    /// Human-readable rendering, `"<series>: <value>"`
    pub plaintext: String,
    /// Channel the packet belongs to
    pub series: SeriesKey,
    /// Key within the series
    pub id: PacketId,
    /// Payload
    pub value: PacketValue,
}

impl Packet {
    /// Create a packet, rendering the plaintext from series and value
    pub fn new(series: SeriesKey, id: PacketId, value: PacketValue) -> Self {
        Self {
            plaintext: format!("{}: {}", series, value),
            series,
            id,
            value,
        }
    }

    /// Create a packet with explicit plaintext
    pub fn with_plaintext(
        plaintext: impl Into<String>,
        series: SeriesKey,
        id: PacketId,
        value: PacketValue,
    ) -> Self {
        Self {
            plaintext: plaintext.into(),
            series,
            id,
            value,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plaintext)
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Connection status as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Pipeline is idle
    #[default]
    Disconnected,
    /// Waiting for the READY handshake
    Connecting,
    /// Handshake completed
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionStatus::Connecting => write!(f, "CONNECTING"),
            ConnectionStatus::Connected => write!(f, "CONNECTED"),
        }
    }
}
