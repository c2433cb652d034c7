//! Serial Worker Thread Implementation
//!
//! The worker owns the transport and runs a poll loop for the life of the
//! pipeline. It is driven by [`PipelineCommand`]s received over a crossbeam
//! channel and reports through the shared [`Datastream`].
//!
//! # States
//!
//! ```text
//! Idle --enable--> (open) --success--> Active --(disable | abort | error)--> Idle
//! ```
//!
//! - **Idle**: transport closed, the loop sleeps in short increments. When
//!   enabled it makes one open attempt. Success publishes `READY`, failure
//!   publishes the error and stays Idle.
//! - **Active**: each cycle does one bounded read and flushes the write queue.
//!   Any transport failure closes the transport, publishes the error and
//!   returns to Idle.
//!
//! A failure also clears the enable flag, so a dead device is not reopened
//! in a tight loop; the session has to enable the pipeline again.
//!
//! Everything the worker holds for a connection (undelivered bytes and
//! events, unacknowledged writes) is discarded when a connection ends in
//! failure and when a new one is enabled. An abort additionally empties the
//! shared queues and acknowledges once nothing from the attempt can reach
//! them any more.
//!
//! # Queue discipline
//!
//! Inbound bytes are handed to the read queue in arrival order. If the read
//! queue lock cannot be taken in time the bytes are held by the worker and
//! handed over on a later cycle.
//!
//! Outbound chunks are copied out of the write queue, written without
//! holding the lock, and only then removed from the head of the queue. The
//! session may keep appending at the tail meanwhile.

use super::datastream::{Datastream, StatusEvent};
use super::transport::SerialTransport;
use crate::config::SerialSettings;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Size of the buffer handed to each transport read
pub const READ_CHUNK_SIZE: usize = 4096;

/// Commands that can be sent to the serial worker
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Open the transport with these settings (reopening if already active)
    Enable(SerialSettings),
    /// Close the transport and go idle
    Disable,
    /// Close the transport, discard the attempt, empty the shared queues and
    /// reply on the sender
    Abort(Sender<()>),
    /// Stop the worker loop
    Shutdown,
}

/// Worker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Active,
}

/// The serial worker that runs the poll loop
pub struct SerialWorker {
    /// Transport for serial I/O (real device or scripted)
    transport: Box<dyn SerialTransport>,
    /// Queues shared with the session
    datastream: Arc<Datastream>,
    /// Command receiver from the session
    command_rx: Receiver<PipelineCommand>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Settings of the most recent enable
    settings: Option<SerialSettings>,
    enabled: bool,
    state: PipelineState,
    idle_poll: Duration,
    read_buf: Vec<u8>,
    /// Inbound bytes not yet handed to the read queue
    held_inbound: Vec<u8>,
    /// Status events not yet handed to the status queue
    held_status: Vec<StatusEvent>,
    /// Chunks already written but still at the head of the write queue
    written_unacked: usize,
}

impl SerialWorker {
    /// Create a new serial worker
    pub fn new(
        transport: Box<dyn SerialTransport>,
        datastream: Arc<Datastream>,
        command_rx: Receiver<PipelineCommand>,
        running: Arc<AtomicBool>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            transport,
            datastream,
            command_rx,
            running,
            settings: None,
            enabled: false,
            state: PipelineState::Idle,
            idle_poll,
            read_buf: vec![0; READ_CHUNK_SIZE],
            held_inbound: Vec::new(),
            held_status: Vec::new(),
            written_unacked: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether the pipeline is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run the worker loop until shutdown
    pub fn run(&mut self) {
        tracing::info!("Serial worker started ({})", self.transport.describe());

        while self.running.load(Ordering::SeqCst) {
            if !self.process_commands() {
                break;
            }
            self.step();
        }

        self.transport.close();
        self.flush_held();
        tracing::info!("Serial worker stopped");
    }

    /// Process pending commands. Returns false when the worker should stop.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => {
                    if !self.handle_command(cmd) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Command channel disconnected, stopping serial worker");
                    self.running.store(false, Ordering::SeqCst);
                    return false;
                }
            }
        }
    }

    /// Handle a single command. Returns false on shutdown.
    fn handle_command(&mut self, cmd: PipelineCommand) -> bool {
        match cmd {
            PipelineCommand::Enable(settings) => {
                tracing::debug!("Enable requested for {}", settings.port_name);
                if self.state == PipelineState::Active {
                    self.transport.close();
                }
                self.reset_connection();
                self.settings = Some(settings);
                self.enabled = true;
                self.state = PipelineState::Idle;
            }
            PipelineCommand::Disable => {
                tracing::debug!("Disable requested");
                self.enabled = false;
                if self.state == PipelineState::Active {
                    self.transport.close();
                    self.emit(StatusEvent::Closed);
                }
                self.state = PipelineState::Idle;
            }
            PipelineCommand::Abort(ack) => {
                tracing::debug!("Abort requested");
                self.enabled = false;
                self.transport.close();
                self.state = PipelineState::Idle;
                self.reset_connection();
                if let Err(e) = self.datastream.clear() {
                    tracing::warn!("Could not empty queues on abort: {}", e);
                }
                // the requester may have stopped waiting
                let _ = ack.send(());
            }
            PipelineCommand::Shutdown => {
                tracing::info!("Shutdown requested");
                self.running.store(false, Ordering::SeqCst);
                return false;
            }
        }
        true
    }

    /// Advance the state machine by one iteration
    pub fn step(&mut self) {
        match self.state {
            PipelineState::Idle if self.enabled => self.open(),
            PipelineState::Idle => std::thread::sleep(self.idle_poll),
            PipelineState::Active => self.cycle(),
        }
        self.flush_held();
    }

    fn open(&mut self) {
        let Some(settings) = self.settings.clone() else {
            self.enabled = false;
            self.state = PipelineState::Idle;
            return;
        };

        match self.transport.open(&settings) {
            Ok(()) => {
                tracing::info!("Serial pipeline active on {}", settings.port_name);
                self.state = PipelineState::Active;
                self.emit(StatusEvent::Ready);
            }
            Err(e) => self.fail(format!("Failed to open {}: {}", settings.port_name, e)),
        }
    }

    /// One read/write cycle while active
    fn cycle(&mut self) {
        match self.transport.read(&mut self.read_buf) {
            Ok(0) => {}
            Ok(n) => self.held_inbound.extend_from_slice(&self.read_buf[..n]),
            Err(e) => {
                self.fail(format!("Read error: {}", e));
                return;
            }
        }

        if let Err(e) = self.write_pending() {
            self.fail(format!("Write error: {}", e));
        }
    }

    /// Write everything currently queued, then drop it from the queue head
    fn write_pending(&mut self) -> crate::error::Result<()> {
        if !self.ack_written() {
            return Ok(());
        }

        let chunks = match self.datastream.write.snapshot() {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::trace!("Skipping write this cycle: {}", e);
                return Ok(());
            }
        };

        let mut result = Ok(());
        for chunk in &chunks {
            if let Err(e) = self.transport.write(chunk) {
                result = Err(e);
                break;
            }
            self.written_unacked += 1;
        }
        self.ack_written();
        result
    }

    /// Remove written chunks from the write queue. Returns false if some
    /// are still waiting for the lock.
    fn ack_written(&mut self) -> bool {
        if self.written_unacked == 0 {
            return true;
        }
        match self.datastream.write.remove_front(self.written_unacked) {
            Ok(()) => {
                self.written_unacked = 0;
                true
            }
            Err(e) => {
                tracing::trace!("Deferring write queue removal: {}", e);
                false
            }
        }
    }

    /// Close the transport, publish the failure and go idle
    fn fail(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.transport.close();
        self.enabled = false;
        self.state = PipelineState::Idle;
        self.reset_connection();
        self.emit(StatusEvent::Error(message));
    }

    /// Forget everything held for the current connection
    fn reset_connection(&mut self) {
        if self.written_unacked > 0 || !self.held_inbound.is_empty() {
            tracing::debug!(
                "Discarding {} unacknowledged writes and {} held bytes",
                self.written_unacked,
                self.held_inbound.len()
            );
        }
        self.written_unacked = 0;
        self.held_inbound.clear();
        self.held_status.clear();
    }

    fn emit(&mut self, event: StatusEvent) {
        self.held_status.push(event);
    }

    /// Hand held inbound bytes and status events to their queues
    fn flush_held(&mut self) {
        if !self.held_inbound.is_empty() {
            match self.datastream.read.lock() {
                Ok(mut queue) => queue.push_back(std::mem::take(&mut self.held_inbound)),
                Err(e) => tracing::trace!("Holding {} inbound bytes: {}", self.held_inbound.len(), e),
            }
        }
        if !self.held_status.is_empty() {
            match self.datastream.status.lock() {
                Ok(mut queue) => queue.extend(self.held_status.drain(..)),
                Err(e) => tracing::trace!("Holding {} status events: {}", self.held_status.len(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::serial::transport::MockSerialTransport;
    use crate::serial::ScriptedTransport;
    use crossbeam_channel::{bounded, Sender};

    fn create_test_worker(
        transport: Box<dyn SerialTransport>,
    ) -> (SerialWorker, Sender<PipelineCommand>, Arc<Datastream>) {
        let (tx, rx) = bounded(16);
        let datastream = Arc::new(Datastream::new(Duration::from_millis(20)));
        let worker = SerialWorker::new(
            transport,
            Arc::clone(&datastream),
            rx,
            Arc::new(AtomicBool::new(true)),
            Duration::from_millis(1),
        );
        (worker, tx, datastream)
    }

    fn settings() -> SerialSettings {
        SerialSettings::new("mock", 115_200)
    }

    /// Apply queued commands and step once
    fn pump(worker: &mut SerialWorker) {
        assert!(worker.process_commands());
        worker.step();
    }

    #[test]
    fn test_worker_starts_idle() {
        let (worker, _tx, _ds) = create_test_worker(Box::new(ScriptedTransport::new()));
        assert_eq!(worker.state(), PipelineState::Idle);
        assert!(!worker.is_enabled());
    }

    #[test]
    fn test_enable_opens_and_reports_ready() {
        let transport = ScriptedTransport::with_chunks([b"hello".to_vec()]);
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));

        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);
        assert_eq!(worker.state(), PipelineState::Active);
        assert_eq!(ds.status.drain().unwrap(), vec![StatusEvent::Ready]);

        pump(&mut worker);
        assert_eq!(ds.read.drain().unwrap(), vec![b"hello".to_vec()]);
        assert!(transport.is_open());
    }

    #[test]
    fn test_open_failure_reports_error_and_clears_enable() {
        let transport = ScriptedTransport::new();
        transport.fail_next_open("no such device");
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));

        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);

        assert_eq!(worker.state(), PipelineState::Idle);
        assert!(!worker.is_enabled());
        let events = ds.status.drain().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].to_string().contains("no such device"));

        // stays idle rather than retrying
        pump(&mut worker);
        assert_eq!(transport.open_count(), 0);
    }

    #[test]
    fn test_read_error_closes_transport() {
        let transport = ScriptedTransport::new();
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);
        ds.status.clear().unwrap();

        transport.fail_next_read("device unplugged");
        pump(&mut worker);

        assert_eq!(worker.state(), PipelineState::Idle);
        assert!(!transport.is_open());
        let events = ds.status.drain().unwrap();
        assert!(matches!(&events[..], [StatusEvent::Error(m)] if m.contains("device unplugged")));
    }

    #[test]
    fn test_disable_reports_closed() {
        let transport = ScriptedTransport::new();
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);
        ds.status.clear().unwrap();

        tx.send(PipelineCommand::Disable).unwrap();
        pump(&mut worker);
        assert_eq!(worker.state(), PipelineState::Idle);
        assert_eq!(ds.status.drain().unwrap(), vec![StatusEvent::Closed]);
        assert!(!transport.is_open());
    }

    #[test]
    fn test_disable_while_idle_is_silent() {
        let (mut worker, tx, ds) = create_test_worker(Box::new(ScriptedTransport::new()));
        tx.send(PipelineCommand::Disable).unwrap();
        pump(&mut worker);
        assert!(ds.status.is_empty().unwrap());
    }

    #[test]
    fn test_writes_drain_queue_in_order() {
        let transport = ScriptedTransport::new();
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);

        ds.write.extend([b"ab".to_vec(), b"cd".to_vec()]).unwrap();
        pump(&mut worker);
        assert_eq!(transport.outbound(), b"abcd");
        assert!(ds.write.is_empty().unwrap());
    }

    #[test]
    fn test_failed_write_keeps_unwritten_chunks() {
        let mut mock = MockSerialTransport::new();
        mock.expect_describe().return_const("mock".to_string());
        mock.expect_open().returning(|_| Ok(()));
        mock.expect_read().returning(|_| Ok(0));
        mock.expect_close().return_const(());
        let mut writes = 0;
        mock.expect_write().returning(move |_| {
            writes += 1;
            if writes == 2 {
                Err(CaptureError::Transport("tx stalled".into()))
            } else {
                Ok(())
            }
        });

        let (mut worker, tx, ds) = create_test_worker(Box::new(mock));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);

        ds.write
            .extend([b"1".to_vec(), b"2".to_vec(), b"3".to_vec()])
            .unwrap();
        pump(&mut worker);

        assert_eq!(worker.state(), PipelineState::Idle);
        assert_eq!(ds.write.snapshot().unwrap(), vec![b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn test_inbound_held_while_read_queue_locked() {
        let transport = ScriptedTransport::with_chunks([b"x".to_vec()]);
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);

        {
            let _guard = ds.read.lock().unwrap();
            worker.step();
        }
        assert!(ds.read.is_empty().unwrap());

        worker.step();
        assert_eq!(ds.read.drain().unwrap(), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_abort_discards_attempt_and_acknowledges() {
        let transport = ScriptedTransport::with_chunks([b"late".to_vec()]);
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);
        assert_eq!(ds.status.snapshot().unwrap(), vec![StatusEvent::Ready]);

        let (ack_tx, ack_rx) = bounded(1);
        tx.send(PipelineCommand::Abort(ack_tx)).unwrap();
        pump(&mut worker);

        assert!(ack_rx.try_recv().is_ok());
        assert_eq!(worker.state(), PipelineState::Idle);
        assert!(!worker.is_enabled());
        assert!(!transport.is_open());
        assert!(ds.status.is_empty().unwrap());
        assert!(ds.read.is_empty().unwrap());

        // nothing from the aborted attempt shows up later
        pump(&mut worker);
        assert!(ds.status.is_empty().unwrap());
    }

    #[test]
    fn test_reconnect_does_not_ack_previous_writes() {
        let datastream = Arc::new(Datastream::new(Duration::from_millis(20)));
        let written = Arc::new(parking_lot::Mutex::new(Vec::<Vec<u8>>::new()));
        let fail_reads = Arc::new(AtomicBool::new(false));
        let holder: Arc<parking_lot::Mutex<Option<std::thread::JoinHandle<()>>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let mut mock = MockSerialTransport::new();
        mock.expect_describe().return_const("mock".to_string());
        mock.expect_open().returning(|_| Ok(()));
        mock.expect_close().return_const(());
        let reads = Arc::clone(&fail_reads);
        mock.expect_read().returning(move |_| {
            if reads.load(Ordering::SeqCst) {
                Err(CaptureError::Transport("link lost".into()))
            } else {
                Ok(0)
            }
        });
        let (log, queues, hold) = (
            Arc::clone(&written),
            Arc::clone(&datastream),
            Arc::clone(&holder),
        );
        mock.expect_write().returning(move |bytes| {
            let first = log.lock().is_empty();
            log.lock().push(bytes.to_vec());
            if first {
                // keep the write queue locked past the worker's lock budget
                let barrier = Arc::new(std::sync::Barrier::new(2));
                let (queues, locked) = (Arc::clone(&queues), Arc::clone(&barrier));
                *hold.lock() = Some(std::thread::spawn(move || {
                    let _guard = queues.write.lock().unwrap();
                    locked.wait();
                    std::thread::sleep(Duration::from_millis(150));
                }));
                barrier.wait();
            }
            Ok(())
        });

        let (tx, rx) = bounded(16);
        let mut worker = SerialWorker::new(
            Box::new(mock),
            Arc::clone(&datastream),
            rx,
            Arc::new(AtomicBool::new(true)),
            Duration::from_millis(1),
        );
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);

        // "A" is written but its removal from the queue times out
        datastream.write.push(b"A".to_vec()).unwrap();
        pump(&mut worker);

        // the link drops before the removal is retried
        fail_reads.store(true, Ordering::SeqCst);
        pump(&mut worker);
        assert_eq!(worker.state(), PipelineState::Idle);
        holder.lock().take().unwrap().join().unwrap();

        // a new connection starts with a fresh queue
        fail_reads.store(false, Ordering::SeqCst);
        datastream.write.clear().unwrap();
        datastream.write.push(b"X".to_vec()).unwrap();
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);
        pump(&mut worker);

        assert_eq!(*written.lock(), vec![b"A".to_vec(), b"X".to_vec()]);
        assert!(datastream.write.is_empty().unwrap());
    }

    #[test]
    fn test_failure_drops_held_inbound() {
        let transport = ScriptedTransport::with_chunks([b"old".to_vec()]);
        let (mut worker, tx, ds) = create_test_worker(Box::new(transport.clone()));
        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);

        {
            let _guard = ds.read.lock().unwrap();
            worker.step();
        }
        transport.fail_next_read("gone");
        worker.step();
        ds.status.clear().unwrap();

        tx.send(PipelineCommand::Enable(settings())).unwrap();
        pump(&mut worker);
        pump(&mut worker);
        assert!(ds.read.is_empty().unwrap());
    }

    #[test]
    fn test_shutdown_stops_processing() {
        let (mut worker, tx, _ds) = create_test_worker(Box::new(ScriptedTransport::new()));
        tx.send(PipelineCommand::Shutdown).unwrap();
        assert!(!worker.process_commands());
        assert!(!worker.running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disconnected_channel_stops_run() {
        let (mut worker, tx, _ds) = create_test_worker(Box::new(ScriptedTransport::new()));
        drop(tx);
        worker.run();
        assert!(!worker.running.load(Ordering::SeqCst));
    }
}
