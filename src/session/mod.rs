//! Capture session
//!
//! [`CaptureSession`] is the consumer side of the serial pipeline. It owns
//! the frame parser and the packet store, spawns the serial worker, and on
//! every tick moves bytes from the read queue through the parser into the
//! store.
//!
//! # Handshake
//!
//! [`CaptureSession::connect`] clears the shared queues, enables the worker
//! and polls the status queue once per frame until `READY` arrives. Other
//! events seen while waiting are surfaced (logged and kept as the last
//! status) but do not end the wait. If the handshake bound elapses the
//! worker is told to abort and the session waits for it to acknowledge, so
//! an open attempt still in flight cannot leave a late `READY` behind. The
//! worker empties the queues as part of the abort and
//! [`CaptureError::HandshakeTimeout`] is returned.
//!
//! # Status reconciliation
//!
//! Each tick inspects the status queue: `READY` stays queued, a closed
//! event is dropped, and errors are surfaced and dropped. An error or close
//! while connected means the link is gone and the session becomes
//! disconnected.
//!
//! # Packet ids
//!
//! The parser keys packets by arrival time. Graph definitions may ask for a
//! different x axis per series, see [`PacketStore::ingest`].

use crate::config::{CaptureSettings, PacketConfig, SerialSettings};
use crate::error::{CaptureError, Result, ResultExt};
use crate::parser::FrameParser;
use crate::serial::{Datastream, PipelineHandle, SerialPipeline, SerialTransport, StatusEvent};
use crate::store::PacketStore;
use crate::types::{ConnectionStatus, SeriesKey};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Orchestrates parser, store and serial worker
pub struct CaptureSession {
    parser: FrameParser,
    store: PacketStore,
    datastream: Arc<Datastream>,
    pipeline: PipelineHandle,
    worker: Option<JoinHandle<()>>,
    capture: CaptureSettings,
    status: ConnectionStatus,
    last_status: Option<StatusEvent>,
}

impl CaptureSession {
    /// Create a session and start its serial worker thread
    pub fn new(
        packet_config: Option<PacketConfig>,
        transport: Box<dyn SerialTransport>,
        capture: CaptureSettings,
    ) -> Result<Self> {
        capture.validate()?;
        let datastream = Arc::new(Datastream::new(capture.lock_timeout()));
        let (pipeline, handle) = SerialPipeline::new(transport, Arc::clone(&datastream), &capture);

        let worker = std::thread::Builder::new()
            .name("serial-worker".to_string())
            .spawn(move || pipeline.run())
            .context("Failed to spawn serial worker")?;

        Ok(Self {
            parser: FrameParser::new(packet_config),
            store: PacketStore::new(capture.output_dir.clone()),
            datastream,
            pipeline: handle,
            worker: Some(worker),
            capture,
            status: ConnectionStatus::Disconnected,
            last_status: None,
        })
    }

    /// Open the serial connection and wait for the worker's `READY`
    pub fn connect(&mut self, settings: SerialSettings) -> Result<()> {
        settings.validate()?;
        if self.status != ConnectionStatus::Disconnected {
            self.disconnect();
        }

        self.datastream.clear()?;
        self.parser.clear();
        self.status = ConnectionStatus::Connecting;

        let port_name = settings.port_name.clone();
        if !self.pipeline.enable(settings) {
            self.status = ConnectionStatus::Disconnected;
            return Err(CaptureError::Channel("serial worker is not running".to_string()));
        }
        tracing::info!("Connecting to {}", port_name);

        let timeout = self.capture.handshake_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            if self.poll_handshake() {
                self.status = ConnectionStatus::Connected;
                self.last_status = Some(StatusEvent::Ready);
                tracing::info!("Connected to {}", port_name);
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(self.capture.frame_period());
        }

        tracing::warn!("No READY from {} within {:?}", port_name, timeout);
        if !self.pipeline.abort(timeout) {
            tracing::warn!("Serial worker did not acknowledge abort within {:?}", timeout);
            if let Err(e) = self.datastream.status.clear() {
                tracing::warn!("Could not clear status queue after timeout: {}", e);
            }
        }
        self.status = ConnectionStatus::Disconnected;
        Err(CaptureError::HandshakeTimeout(timeout))
    }

    /// Consume status events up to and including `READY`. Returns true once
    /// `READY` was seen.
    fn poll_handshake(&mut self) -> bool {
        loop {
            match self.datastream.status.pop() {
                Ok(Some(StatusEvent::Ready)) => return true,
                Ok(Some(event)) => self.surface(event),
                Ok(None) => return false,
                Err(e) => {
                    tracing::trace!("Status poll skipped: {}", e);
                    return false;
                }
            }
        }
    }

    /// Close the serial connection
    pub fn disconnect(&mut self) {
        if self.status != ConnectionStatus::Disconnected {
            tracing::info!("Disconnecting");
        }
        self.pipeline.disable();
        self.status = ConnectionStatus::Disconnected;
    }

    /// Queue bytes for the device
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.status != ConnectionStatus::Connected {
            return Err(CaptureError::NotConnected);
        }
        self.datastream.write.push(bytes.to_vec())
    }

    /// Run one orchestrator frame. Returns the number of packets stored.
    pub fn tick(&mut self) -> usize {
        let stored = match self.datastream.read.drain() {
            Ok(chunks) => {
                for chunk in &chunks {
                    self.parser.append(chunk);
                }
                let packets = self.parser.process();
                let count = self.store.ingest(self.parser.config(), packets);
                if count > 0 {
                    tracing::debug!("Stored {} packets from {} chunks", count, chunks.len());
                }
                count
            }
            Err(e) => {
                tracing::trace!("Read drain skipped: {}", e);
                0
            }
        };

        self.reconcile_status();
        stored
    }

    /// Tick at the configured frame rate until `stop` is set
    pub fn run_until(&mut self, stop: &AtomicBool) {
        let period = self.capture.frame_period();
        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick();
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        // pick up whatever arrived during the last frame
        self.tick();
    }

    fn reconcile_status(&mut self) {
        let events = match self.datastream.status.take_where(|e| !e.is_ready()) {
            Ok(events) => events,
            Err(e) => {
                tracing::trace!("Status reconcile skipped: {}", e);
                return;
            }
        };

        for event in events {
            if self.status == ConnectionStatus::Connected {
                tracing::info!("Connection lost: {}", event);
                self.status = ConnectionStatus::Disconnected;
            }
            match event {
                StatusEvent::Closed => tracing::debug!("Dropped status: {}", event),
                other => self.surface(other),
            }
        }
    }

    fn surface(&mut self, event: StatusEvent) {
        tracing::warn!("Serial status: {}", event);
        self.last_status = Some(event);
    }

    /// Export one series
    pub fn save(&self, series: &SeriesKey) -> Result<PathBuf> {
        self.store.save(series)
    }

    /// Export every series into one run directory
    pub fn save_all(&self) -> Result<PathBuf> {
        self.store.save_all()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Most recent status event that was surfaced
    pub fn last_status(&self) -> Option<&StatusEvent> {
        self.last_status.as_ref()
    }

    pub fn store(&self) -> &PacketStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PacketStore {
        &mut self.store
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    /// Replace the packet format. Sequence numbering restarts.
    pub fn set_packet_config(&mut self, config: Option<PacketConfig>) {
        self.parser.set_config(config);
        self.store.reset_sequences();
    }

    pub fn datastream(&self) -> &Arc<Datastream> {
        &self.datastream
    }

    pub fn capture_settings(&self) -> &CaptureSettings {
        &self.capture
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.pipeline.shutdown();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Serial worker panicked");
            }
        }
    }
}
