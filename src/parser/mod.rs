//! Frame parser
//!
//! [`FrameParser`] turns an unbounded byte stream into [`Packet`]s. Bytes are
//! appended as they arrive and [`FrameParser::process`] extracts every
//! packet that can be derived from the buffer so far. Anything that might
//! still become part of a packet (an unterminated segment, a partial frame,
//! an unpaired id) stays buffered for the next call.
//!
//! Extraction dispatches on the configured [`PacketFormat`]:
//!
//! | Kind | Module | Framing |
//! |------|--------|---------|
//! | 0 | [`delimited`] | delimiter-separated `id=value` segments |
//! | 1 | [`paired`] | alternating id and data segments tagged by specifiers |
//! | 2 | [`hex_frame`] | fixed-width ASCII hex frames |
//! | 3 | [`bit_frame`] | fixed-width bit-packed frames |
//!
//! Segments that fail id or shape checks are line noise. They are dropped
//! (and traced) rather than reported as errors.

pub mod bit_frame;
pub mod delimited;
pub mod hex_frame;
pub mod paired;

use crate::config::{PacketConfig, PacketFormat};
use crate::types::{now_ns, Packet, PacketId, PacketValue, SeriesKey, DEFAULT_SERIES};

/// Mints strictly increasing timestamp ids
///
/// Ids come from the wall clock in nanoseconds. Packets extracted in the
/// same instant (or a clock that steps backwards) get the previous id plus
/// one, so extraction order is always preserved.
#[derive(Debug, Default, Clone)]
pub struct IdClock {
    last: Option<u128>,
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id
    pub fn mint(&mut self) -> PacketId {
        let now = now_ns();
        let id = match self.last {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last = Some(id);
        PacketId::Timestamp(id)
    }
}

/// Stateful, resumable stream-to-packet parser
#[derive(Debug, Default)]
pub struct FrameParser {
    config: Option<PacketConfig>,
    buffer: Vec<u8>,
    clock: IdClock,
}

impl FrameParser {
    /// Create a parser. Without a config every `process` call yields the
    /// whole buffer as one plaintext packet.
    pub fn new(config: Option<PacketConfig>) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            clock: IdClock::new(),
        }
    }

    /// Replace the packet format. Buffered bytes were framed for the old
    /// format and are discarded.
    pub fn set_config(&mut self, config: Option<PacketConfig>) {
        if !self.buffer.is_empty() {
            tracing::debug!(
                "Discarding {} buffered bytes on packet format change",
                self.buffer.len()
            );
        }
        self.config = config;
        self.buffer.clear();
    }

    /// Current packet format
    pub fn config(&self) -> Option<&PacketConfig> {
        self.config.as_ref()
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Bytes waiting for more input
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Add bytes to the accumulation buffer
    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extract every packet currently derivable from the buffer, in order
    pub fn process(&mut self) -> Vec<Packet> {
        let Some(config) = &self.config else {
            return self.process_unformatted();
        };

        let before = self.buffer.len();
        let packets = match &config.format {
            PacketFormat::Delimited(format) => {
                delimited::extract(format, &mut self.buffer, &mut self.clock)
            }
            PacketFormat::Paired(format) => {
                paired::extract(format, &mut self.buffer, &mut self.clock)
            }
            PacketFormat::HexFrame(format) => {
                hex_frame::extract(format, &mut self.buffer, &mut self.clock)
            }
            PacketFormat::BitFrame(format) => {
                bit_frame::extract(format, &mut self.buffer, &mut self.clock)
            }
        };

        if !packets.is_empty() {
            tracing::trace!(
                "Extracted {} packets ({} -> {} buffered bytes)",
                packets.len(),
                before,
                self.buffer.len()
            );
        }
        packets
    }

    fn process_unformatted(&mut self) -> Vec<Packet> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        vec![Packet::with_plaintext(
            text,
            SeriesKey::text(DEFAULT_SERIES),
            self.clock.mint(),
            PacketValue::Int(0),
        )]
    }
}
