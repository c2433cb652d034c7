//! # serial-capture: Serial Packet Capture
//!
//! Reads a byte stream from a serial device, splits it into packets
//! according to a declarative JSON packet config, and collects the packets
//! per series for CSV export.
//!
//! ## Architecture
//!
//! - **Serial**: A worker thread owns the transport and shuttles bytes
//!   through lock-bounded queues shared with the session
//! - **Parser**: Stateful framer for the four packet kinds (delimited,
//!   paired, hex frames, bit frames)
//! - **Store**: Insertion-ordered packets per series, exported as CSV
//! - **Session**: Connect handshake, per-frame drain/parse/store ticks and
//!   status reconciliation
//! - **Communication**: Crossbeam channel for worker commands
//!
//! ## Configuration
//!
//! Application settings (serial defaults, frame rate, timeouts, output
//! directory) are stored as TOML in the platform config directory under
//! `dev.hxyulin.serial-capture`:
//!
//! - **Linux**: `~/.config/dev.hxyulin.serial-capture/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.serial-capture/config.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.serial-capture\config.toml`
//!
//! ## Example
//!
//! ```ignore
//! use serial_capture::{
//!     config::{AppConfig, PacketConfig},
//!     serial::SerialPortTransport,
//!     session::CaptureSession,
//! };
//!
//! fn main() -> serial_capture::Result<()> {
//!     let config = AppConfig::load_or_default();
//!     let packets = PacketConfig::load("type0.json")?;
//!
//!     let mut session = CaptureSession::new(
//!         Some(packets),
//!         Box::new(SerialPortTransport::new()),
//!         config.capture.clone(),
//!     )?;
//!     session.connect(config.serial.clone())?;
//!
//!     for _ in 0..300 {
//!         session.tick();
//!         std::thread::sleep(session.capture_settings().frame_period());
//!     }
//!
//!     let dir = session.save_all()?;
//!     println!("saved to {:?}", dir);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod serial;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, CaptureSettings, PacketConfig, SerialSettings};
pub use error::{CaptureError, Result};
pub use parser::FrameParser;
pub use serial::{ScriptedTransport, SerialPortTransport, SerialTransport};
pub use session::CaptureSession;
pub use store::PacketStore;
pub use types::{ConnectionStatus, Packet, PacketId, PacketValue, SeriesKey};
