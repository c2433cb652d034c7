//! In-memory transport for tests and offline runs
//!
//! A [`ScriptedTransport`] replays inbound chunks in order and records every
//! byte written to it. Failures can be queued for the next open, read or
//! write, and the next open can be made slow. Clones share state, so a test can keep a handle after the
//! transport has moved into the worker.

use super::transport::SerialTransport;
use crate::config::SerialSettings;
use crate::error::{CaptureError, Result, ResultExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Longest a scripted read waits when nothing is queued
const IDLE_READ_WAIT: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct ScriptState {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<u8>,
    open_failures: VecDeque<String>,
    open_delay: Option<Duration>,
    read_failure: Option<String>,
    write_failure: Option<String>,
    read_timeout: Duration,
    open: bool,
    open_count: usize,
}

/// Replays scripted inbound bytes and captures outbound bytes
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that replays `chunks` in order
    pub fn with_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let transport = Self::new();
        for chunk in chunks {
            transport.push_inbound(chunk);
        }
        transport
    }

    /// Transport that replays a file in reads of at most `chunk_size` bytes
    pub fn from_file(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read replay file {:?}", path))?;
        Ok(Self::with_chunks(
            bytes.chunks(chunk_size.max(1)).map(<[u8]>::to_vec),
        ))
    }

    /// Queue bytes to be read
    pub fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
        self.state.lock().inbound.push_back(chunk.into());
    }

    /// Make the next `open` fail with `message`
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.state.lock().open_failures.push_back(message.into());
    }

    /// Make the next `open` take `delay` before it completes
    pub fn delay_next_open(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Make the next `read` fail with `message`
    pub fn fail_next_read(&self, message: impl Into<String>) {
        self.state.lock().read_failure = Some(message.into());
    }

    /// Make the next `write` fail with `message`
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.state.lock().write_failure = Some(message.into());
    }

    /// Everything written so far
    pub fn outbound(&self) -> Vec<u8> {
        self.state.lock().outbound.clone()
    }

    /// Inbound chunks not yet read
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }
}

impl SerialTransport for ScriptedTransport {
    fn open(&mut self, settings: &SerialSettings) -> Result<()> {
        let delay = self.state.lock().open_delay.take();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if let Some(message) = state.open_failures.pop_front() {
            return Err(CaptureError::Transport(message));
        }
        state.open = true;
        state.open_count += 1;
        state.read_timeout = settings.read_timeout();
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let wait = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(CaptureError::NotConnected);
            }
            if let Some(message) = state.read_failure.take() {
                return Err(CaptureError::Transport(message));
            }
            if let Some(mut chunk) = state.inbound.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.inbound.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
            state.read_timeout.min(IDLE_READ_WAIT)
        };
        std::thread::sleep(wait);
        Ok(0)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(CaptureError::NotConnected);
        }
        if let Some(message) = state.write_failure.take() {
            return Err(CaptureError::Transport(message));
        }
        state.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted transport".to_string()
    }
}
