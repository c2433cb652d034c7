//! Configuration module for serial-capture
//!
//! Two kinds of configuration live here:
//! - [`PacketConfig`] - the JSON packet format that drives the frame parser
//! - [`AppConfig`] - TOML application settings (serial line, capture loop, output)
//!
//! # Config Location
//!
//! Without an explicit `--config` path the application settings are read
//! from the platform config directory:
//! - **Linux**: `~/.config/dev.hxyulin.serial-capture/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.serial-capture/config.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.serial-capture\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use serial_capture::config::{AppConfig, PacketConfig};
//!
//! let app = AppConfig::load_or_default();
//! let packet = PacketConfig::load("packet.json")?;
//! ```

pub mod packet_format;
pub mod settings;

pub use packet_format::*;
pub use settings::*;

use crate::error::{CaptureError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.serial-capture";

/// Application settings filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default orchestrator frame rate in Hz
pub const DEFAULT_FRAME_RATE_HZ: u32 = 30;

/// Default bound on the READY handshake in milliseconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Default retry budget for acquiring a queue lock in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 50;

/// Default worker sleep while the pipeline is disabled, in milliseconds
pub const DEFAULT_IDLE_POLL_MS: u64 = 10;

/// Default export root
pub const DEFAULT_OUTPUT_DIR: &str = "output";

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the application settings file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Capture Settings ====================

/// Timing and output settings for a capture run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// How often the session drains the read queue
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Budget for each bounded lock attempt on a shared queue
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Root directory for exported runs
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_frame_rate_hz() -> u32 {
    DEFAULT_FRAME_RATE_HZ
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_idle_poll_ms() -> u64 {
    DEFAULT_IDLE_POLL_MS
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            output_dir: default_output_dir(),
            log_dir: None,
        }
    }
}

impl CaptureSettings {
    /// Time between two orchestrator ticks
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Check the settings
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate_hz == 0 {
            return Err(CaptureError::invalid_config(
                "frame_rate_hz",
                "must be at least 1",
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(CaptureError::invalid_config(
                "lock_timeout_ms",
                "lock attempts need a non-zero budget",
            ));
        }
        Ok(())
    }
}

// ==================== App Config ====================

/// Persistent application settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serial line used when the command line does not override it
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub capture: CaptureSettings,
}

impl AppConfig {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CaptureError::invalid_config("toml", e.to_string()))?;
        config.capture.validate()?;
        Ok(config)
    }

    /// Load settings from the platform config directory, returning defaults
    /// when the file is missing or unreadable
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings as TOML, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }
}
