//! CSV export of packet series
//!
//! Each save creates a fresh run directory named after the save time, so
//! earlier exports are never overwritten:
//!
//! ```text
//! output/
//!   20240521-143000/
//!     output.csv
//!   20240521-143000-1/
//!     output.csv
//! ```

use crate::error::{CaptureError, Result, ResultExt};
use crate::types::{Packet, SeriesKey};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Timestamp format of run directory names
pub const RUN_DIR_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Column headers of every exported file
pub const CSV_HEADER: [&str; 2] = ["id", "value"];

/// Create a new, previously unused run directory under `root`
pub fn create_run_dir(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create output root {:?}", root))?;

    let stamp = chrono::Local::now().format(RUN_DIR_FORMAT).to_string();
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            stamp.clone()
        } else {
            format!("{}-{}", stamp, suffix)
        };
        let dir = root.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => {
                return Err(CaptureError::Io(e).with_context(format!("Failed to create {:?}", dir)))
            }
        }
    }
}

/// File name for a series, safe on every platform
///
/// Integer series are written in hex to match how binary packet ids are
/// configured.
pub fn file_name(series: &SeriesKey) -> String {
    let stem = match series {
        SeriesKey::Text(name) => name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>(),
        SeriesKey::Int(id) => format!("{:#x}", id),
    };
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "series.csv".to_string()
    } else {
        format!("{}.csv", stem)
    }
}

/// [`file_name`] made unique among the names already in `used`
///
/// Distinct series can sanitise to the same name (`a/b` and `a_b`). Later
/// ones get a `-1`, `-2`, ... suffix on the stem. Names are compared without
/// case so exports survive case-insensitive file systems.
pub fn unique_file_name(series: &SeriesKey, used: &mut HashSet<String>) -> String {
    let base = file_name(series);
    let stem = base.strip_suffix(".csv").unwrap_or(&base);
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            base.clone()
        } else {
            format!("{}-{}.csv", stem, suffix)
        };
        if used.insert(name.to_lowercase()) {
            return name;
        }
        suffix += 1;
    }
}

/// Write one series as an `id,value` table in insertion order
pub fn write_series<'a>(path: &Path, packets: impl IntoIterator<Item = &'a Packet>) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;

    let mut rows = 0;
    for packet in packets {
        writer.write_record([packet.id.to_string(), packet.value.to_string()])?;
        rows += 1;
    }
    writer.flush().context("Failed to flush export")?;

    tracing::debug!("Wrote {} rows to {:?}", rows, path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PacketId, PacketValue};
    use tempfile::TempDir;

    #[test]
    fn test_file_name_sanitised() {
        assert_eq!(file_name(&SeriesKey::text("output")), "output.csv");
        assert_eq!(file_name(&SeriesKey::text("a/b c")), "a_b_c.csv");
        assert_eq!(file_name(&SeriesKey::text("..")), "series.csv");
        assert_eq!(file_name(&SeriesKey::Int(0x432)), "0x432.csv");
    }

    #[test]
    fn test_colliding_names_get_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(unique_file_name(&SeriesKey::text("a/b"), &mut used), "a_b.csv");
        assert_eq!(unique_file_name(&SeriesKey::text("a_b"), &mut used), "a_b-1.csv");
        assert_eq!(unique_file_name(&SeriesKey::text("a b"), &mut used), "a_b-2.csv");
        assert_eq!(unique_file_name(&SeriesKey::text("A_B"), &mut used), "A_B-3.csv");
        assert_eq!(unique_file_name(&SeriesKey::text("c"), &mut used), "c.csv");
    }

    #[test]
    fn test_run_dirs_never_reused() {
        let root = TempDir::new().unwrap();
        let first = create_run_dir(root.path()).unwrap();
        let second = create_run_dir(root.path()).unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(second.is_dir());
    }

    #[test]
    fn test_write_series() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.csv");
        let packets = vec![
            Packet::new(SeriesKey::text("s"), PacketId::Index(0), PacketValue::from("a")),
            Packet::new(SeriesKey::text("s"), PacketId::Index(1), PacketValue::from("b,c")),
        ];
        assert_eq!(write_series(&path, &packets).unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,value\n0,a\n1,\"b,c\"\n");
    }
}
