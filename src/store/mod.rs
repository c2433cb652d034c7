//! Packet store
//!
//! An insertion-ordered collection of packets per series. Inserting a packet
//! whose id already exists in its series replaces it in place. Series are
//! remembered from first sight for the life of the store, even if every
//! packet in them is removed.
//!
//! [`PacketStore::ingest`] is the path parsed packets take into the store:
//! ids are rewritten per the series' graph definition, then upserted.

pub mod export;
mod mapping;

pub use mapping::IdRemapper;

use crate::config::PacketConfig;
use crate::error::{CaptureError, Result};
use crate::types::{Packet, PacketId, SeriesKey};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Packets of one series keyed by id, in insertion order
pub type Series = IndexMap<PacketId, Packet>;

/// Per-series packet collection with CSV export
#[derive(Debug)]
pub struct PacketStore {
    series: IndexMap<SeriesKey, Series>,
    output_root: PathBuf,
    remapper: IdRemapper,
}

impl Default for PacketStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_OUTPUT_DIR)
    }
}

impl PacketStore {
    /// Create an empty store exporting under `output_root`
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            series: IndexMap::new(),
            output_root: output_root.into(),
            remapper: IdRemapper::new(),
        }
    }

    /// Directory runs are exported under
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn set_output_root(&mut self, root: impl Into<PathBuf>) {
        self.output_root = root.into();
    }

    /// Upsert a packet, returning the packet it replaced
    pub fn insert(&mut self, packet: Packet) -> Option<Packet> {
        self.series
            .entry(packet.series.clone())
            .or_default()
            .insert(packet.id.clone(), packet)
    }

    /// Remap the ids of freshly parsed packets and upsert them. Returns the
    /// number of packets stored.
    pub fn ingest(&mut self, config: Option<&PacketConfig>, packets: Vec<Packet>) -> usize {
        let count = packets.len();
        for packet in packets {
            let packet = match config {
                Some(config) => {
                    let series = &self.series;
                    self.remapper.apply(
                        config,
                        |key| series.get(key)?.last().map(|(_, p)| p),
                        packet,
                    )
                }
                None => packet,
            };
            self.insert(packet);
        }
        count
    }

    /// Restart sequence numbering, e.g. after the packet format changed
    pub fn reset_sequences(&mut self) {
        self.remapper.reset();
    }

    /// Remove a packet. Removing an unknown packet is a no-op.
    pub fn remove(&mut self, series: &SeriesKey, id: &PacketId) -> Option<Packet> {
        self.series.get_mut(series)?.shift_remove(id)
    }

    /// Packets of a series in insertion order; empty for an unknown series
    pub fn get_series(&self, series: &SeriesKey) -> &Series {
        static EMPTY: OnceLock<Series> = OnceLock::new();
        self.series
            .get(series)
            .unwrap_or_else(|| EMPTY.get_or_init(Series::new))
    }

    /// Number of packets in a series
    pub fn series_count(&self, series: &SeriesKey) -> usize {
        self.series.get(series).map_or(0, Series::len)
    }

    /// Every series ever seen, in first-seen order
    pub fn series(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.keys()
    }

    /// Total number of packets across all series
    pub fn packet_count(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packet_count() == 0
    }

    /// Most recently inserted packet of a series
    pub fn latest(&self, series: &SeriesKey) -> Option<&Packet> {
        self.series.get(series)?.last().map(|(_, p)| p)
    }

    /// Export one series into a new run directory, returning the file written
    pub fn save(&self, series: &SeriesKey) -> Result<PathBuf> {
        let packets = self
            .series
            .get(series)
            .ok_or_else(|| CaptureError::Export(format!("Unknown series '{}'", series)))?;

        let dir = export::create_run_dir(&self.output_root)?;
        let path = dir.join(export::file_name(series));
        export::write_series(&path, packets.values())?;
        tracing::info!("Saved series '{}' to {:?}", series, path);
        Ok(path)
    }

    /// Export every series into one new run directory, returning the directory
    pub fn save_all(&self) -> Result<PathBuf> {
        let dir = export::create_run_dir(&self.output_root)?;
        let mut used = HashSet::new();
        for (series, packets) in &self.series {
            let name = export::unique_file_name(series, &mut used);
            export::write_series(&dir.join(name), packets.values())?;
        }
        tracing::info!(
            "Saved {} series ({} packets) to {:?}",
            self.series.len(),
            self.packet_count(),
            dir
        );
        Ok(dir)
    }
}
