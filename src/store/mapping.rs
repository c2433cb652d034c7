//! Packet id remapping
//!
//! The parser keys every packet by arrival time. A series' graph definition
//! may ask for a different x axis, see [`IdMapping`]; [`IdRemapper`] rewrites
//! packet ids accordingly just before they are stored.

use crate::config::{IdMapping, PacketConfig};
use crate::types::{Packet, PacketId, SeriesKey};
use std::collections::HashMap;

/// Per-series id rewriting state
#[derive(Debug, Default, Clone)]
pub struct IdRemapper {
    /// Next sequence index per series
    sequence: HashMap<SeriesKey, u64>,
}

impl IdRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart sequence numbering for every series
    pub fn reset(&mut self) {
        self.sequence.clear();
    }

    /// Rewrite `packet.id` according to its series' id mapping
    ///
    /// `latest` looks up the most recent packet of another series; a series
    /// mapping keeps the timestamp until that series has a value.
    pub fn apply<'a>(
        &mut self,
        config: &PacketConfig,
        latest: impl FnOnce(&SeriesKey) -> Option<&'a Packet>,
        mut packet: Packet,
    ) -> Packet {
        match config.id_mapping(&packet.series) {
            IdMapping::Timestamp => {}
            IdMapping::Sequence => {
                let next = self.sequence.entry(packet.series.clone()).or_insert(0);
                packet.id = PacketId::Index(*next);
                *next += 1;
            }
            IdMapping::Series(name) => {
                match config.series_key(&name).as_ref().and_then(latest) {
                    Some(other) => packet.id = PacketId::Value(other.value.clone()),
                    None => tracing::trace!(
                        "No value for '{}' yet, keeping timestamp for {}",
                        name,
                        packet.series
                    ),
                }
            }
        }
        packet
    }
}
