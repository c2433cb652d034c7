//! SerialTransport trait for byte sources and sinks
//!
//! The worker only ever talks to a [`SerialTransport`]. Real devices go
//! through [`SerialPortTransport`](super::SerialPortTransport); tests and
//! offline runs use [`ScriptedTransport`](super::ScriptedTransport).

use crate::config::SerialSettings;
use crate::error::Result;

/// A byte stream the serial worker can open, read, write and close
///
/// Implementations must bound every call: `read` waits at most the
/// configured read timeout and returns `Ok(0)` when nothing arrived.
#[cfg_attr(test, mockall::automock)]
pub trait SerialTransport: Send {
    /// Open the device described by `settings`
    fn open(&mut self, settings: &SerialSettings) -> Result<()>;

    /// Close the device. Closing a closed transport is a no-op.
    fn close(&mut self);

    /// Check if the device is open
    fn is_open(&self) -> bool;

    /// Read whatever is available into `buf`, returning the byte count
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `bytes` or fail
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String {
        "serial transport".to_string()
    }
}
