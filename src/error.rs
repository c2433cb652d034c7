//! Error handling for serial-capture
//!
//! This module defines the error taxonomy and a Result alias for use
//! throughout the crate.
//!
//! Framing noise (segments that fail id or shape checks while parsing) is
//! deliberately absent here: it is filtered inside the parser and never
//! surfaces as an error value.

use std::time::Duration;
use thiserror::Error;

/// Main error type for serial-capture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// A packet format or settings file is malformed or missing a required field
    #[error("Invalid configuration field `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Opening, reading or writing the transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The pipeline did not report READY within the handshake bound
    #[error("TIMEOUT: no READY status within {0:?}")]
    HandshakeTimeout(Duration),

    /// An operation needed an open connection
    #[error("Not connected to a serial device")]
    NotConnected,

    /// A shared queue lock could not be acquired within its retry budget
    #[error("Timed out waiting for the {0} queue lock")]
    LockTimeout(&'static str),

    /// Errors related to channel communication with the worker
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors while writing exported series
    #[error("Export error: {0}")]
    Export(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CaptureError>,
    },
}

impl CaptureError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CaptureError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an [`CaptureError::InvalidConfig`]
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CaptureError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error (or the error it wraps) is a configuration error
    pub fn is_config_error(&self) -> bool {
        match self {
            CaptureError::InvalidConfig { .. } => true,
            CaptureError::WithContext { source, .. } => source.is_config_error(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CaptureError {
    fn from(err: toml::de::Error) -> Self {
        CaptureError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for CaptureError {
    fn from(err: toml::ser::Error) -> Self {
        CaptureError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for CaptureError {
    fn from(err: csv::Error) -> Self {
        CaptureError::Export(err.to_string())
    }
}

impl From<serialport::Error> for CaptureError {
    fn from(err: serialport::Error) -> Self {
        CaptureError::Transport(err.to_string())
    }
}

/// Result type alias for serial-capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CaptureError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CaptureError::Io(e).with_context(f()))
    }
}
