//! Serial line settings
//!
//! These mirror the connection panel of a serial terminal: port, baud rate,
//! character size, parity and stop bits, plus the bounded timeouts the
//! pipeline uses for every transport read and write.
//!
//! Opening the device is the transport's job; this module only describes
//! and validates what should be opened.

use crate::error::{CaptureError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bounded timeout for a single transport read, in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;

/// Default bounded timeout for a single transport write, in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 200;

/// Character size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

/// Bit order of the device. Informational; the transport does not reorder bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Endian {
    #[default]
    Lsb,
    Msb,
}

/// Parity checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Everything needed to open a serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Device path or name (e.g. `/dev/ttyUSB0`, `COM3`)
    #[serde(default)]
    pub port_name: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub data_bits: DataBits,

    #[serde(default)]
    pub endian: Endian,

    #[serde(default)]
    pub parity: Parity,

    #[serde(default)]
    pub stop_bits: StopBits,

    /// Bound on a single read call
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Bound on a single write call
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            endian: Endian::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl SerialSettings {
    /// Settings for a port at a baud rate, everything else default
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Check the settings before handing them to the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(CaptureError::invalid_config("port_name", "no port selected"));
        }
        if self.baud_rate == 0 {
            return Err(CaptureError::invalid_config(
                "baud_rate",
                "baud rate must be a positive integer",
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(CaptureError::invalid_config(
                "read_timeout_ms",
                "reads must have a bounded, non-zero timeout",
            ));
        }
        Ok(())
    }

    /// Bound on a single read
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Bound on a single write
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
