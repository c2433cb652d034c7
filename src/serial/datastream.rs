//! Shared queues between the serial worker and the session
//!
//! The [`Datastream`] holds three independent FIFOs, each behind its own
//! mutex:
//!
//! - `read` - inbound byte chunks, worker to session
//! - `write` - outbound byte chunks, session to worker
//! - `status` - [`StatusEvent`]s, worker to session
//!
//! Every lock is taken with a bounded retry budget, so neither side can
//! block forever on the other. No code path holds two queue locks at once.

use crate::error::{CaptureError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Literal token of a successful open
pub const READY_TOKEN: &str = "READY";

/// Message of a connection closed on request
pub const CLOSED_MESSAGE: &str = "Serial connection was closed.";

/// Single lock attempt inside the retry loop
const LOCK_SLICE: Duration = Duration::from_millis(1);

/// Event published by the serial worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The transport opened and the worker is shuttling bytes
    Ready,
    /// The transport was closed after a disable
    Closed,
    /// Opening, reading or writing failed
    Error(String),
}

impl StatusEvent {
    pub fn is_ready(&self) -> bool {
        matches!(self, StatusEvent::Ready)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Ready => f.write_str(READY_TOKEN),
            StatusEvent::Closed => f.write_str(CLOSED_MESSAGE),
            StatusEvent::Error(msg) => f.write_str(msg),
        }
    }
}

/// A FIFO behind a mutex that is only ever locked with a bounded wait
#[derive(Debug)]
pub struct LockedQueue<T> {
    name: &'static str,
    timeout: Duration,
    inner: Mutex<VecDeque<T>>,
}

impl<T> LockedQueue<T> {
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            timeout,
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue name used in errors and logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, retrying in short slices until the budget runs out
    pub fn lock(&self) -> Result<MutexGuard<'_, VecDeque<T>>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(guard) = self.inner.try_lock_for(LOCK_SLICE) {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(CaptureError::LockTimeout(self.name));
            }
            std::hint::spin_loop();
        }
    }

    /// Append at the tail
    pub fn push(&self, item: T) -> Result<()> {
        self.lock()?.push_back(item);
        Ok(())
    }

    /// Append several items at the tail, in order
    pub fn extend(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        self.lock()?.extend(items);
        Ok(())
    }

    /// Remove and return the head
    pub fn pop(&self) -> Result<Option<T>> {
        Ok(self.lock()?.pop_front())
    }

    /// Remove and return everything queued
    pub fn drain(&self) -> Result<Vec<T>> {
        Ok(self.lock()?.drain(..).collect())
    }

    /// Remove up to `count` items from the head
    pub fn remove_front(&self, count: usize) -> Result<()> {
        let mut queue = self.lock()?;
        let count = count.min(queue.len());
        queue.drain(..count);
        Ok(())
    }

    /// Remove the items matching `pred`, keeping the rest in order
    pub fn take_where(&self, mut pred: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
        let mut queue = self.lock()?;
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        for item in queue.drain(..) {
            if pred(&item) {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }
        *queue = kept;
        Ok(taken)
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

impl<T: Clone> LockedQueue<T> {
    /// Copy of everything queued, leaving the queue untouched
    pub fn snapshot(&self) -> Result<Vec<T>> {
        Ok(self.lock()?.iter().cloned().collect())
    }
}

/// The three queues shared by the worker and the session
#[derive(Debug)]
pub struct Datastream {
    pub read: LockedQueue<Vec<u8>>,
    pub write: LockedQueue<Vec<u8>>,
    pub status: LockedQueue<StatusEvent>,
}

impl Datastream {
    /// Create empty queues sharing one lock budget
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            read: LockedQueue::new("read", lock_timeout),
            write: LockedQueue::new("write", lock_timeout),
            status: LockedQueue::new("status", lock_timeout),
        }
    }

    /// Empty every queue, one lock at a time
    pub fn clear(&self) -> Result<()> {
        self.read.clear()?;
        self.write.clear()?;
        self.status.clear()
    }
}

impl Default for Datastream {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_LOCK_TIMEOUT_MS))
    }
}
