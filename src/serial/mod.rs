//! Serial pipeline
//!
//! This module moves bytes between a serial transport and the rest of the
//! application on a dedicated worker thread. The worker and the session
//! share a [`Datastream`] (read, write and status queues); the session
//! drives the worker with [`PipelineCommand`]s over a crossbeam channel.
//!
//! # Components
//!
//! - [`SerialPipeline`] - Owns the worker side; run it on its own thread
//! - [`PipelineHandle`] - Session-side handle for sending commands
//! - [`SerialWorker`] - The poll loop and its state machine
//! - [`SerialTransport`] - Byte source/sink seam
//! - [`SerialPortTransport`] / [`ScriptedTransport`] - Real and in-memory transports
//!
//! # Example
//!
//! ```ignore
//! use serial_capture::serial::{Datastream, SerialPipeline, SerialPortTransport};
//! use std::sync::Arc;
//!
//! let datastream = Arc::new(Datastream::default());
//! let (pipeline, handle) = SerialPipeline::new(
//!     Box::new(SerialPortTransport::new()),
//!     Arc::clone(&datastream),
//!     &CaptureSettings::default(),
//! );
//! std::thread::spawn(move || pipeline.run());
//!
//! handle.enable(SerialSettings::new("/dev/ttyUSB0", 115_200));
//! // ... poll datastream.status for READY, then drain datastream.read
//! handle.shutdown();
//! ```

pub mod datastream;
pub mod port;
pub mod scripted;
pub mod transport;
pub mod worker;

pub use datastream::{Datastream, LockedQueue, StatusEvent, CLOSED_MESSAGE, READY_TOKEN};
pub use port::{list_ports, PortInfo, SerialPortTransport};
pub use scripted::ScriptedTransport;
pub use transport::SerialTransport;
pub use worker::{PipelineCommand, PipelineState, SerialWorker};

use crate::config::{CaptureSettings, SerialSettings};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Session-side handle to a running pipeline
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    command_sender: Sender<PipelineCommand>,
}

impl PipelineHandle {
    /// Send a command to the worker. Returns false if the worker is gone.
    pub fn send_command(&self, cmd: PipelineCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Open the transport with `settings`
    pub fn enable(&self, settings: SerialSettings) -> bool {
        self.send_command(PipelineCommand::Enable(settings))
    }

    /// Close the transport
    pub fn disable(&self) -> bool {
        self.send_command(PipelineCommand::Disable)
    }

    /// Close the transport and empty the shared queues, waiting up to `wait`
    /// for the worker to confirm. Returns false if no confirmation arrived.
    pub fn abort(&self, wait: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if !self.send_command(PipelineCommand::Abort(ack_tx)) {
            return false;
        }
        ack_rx.recv_timeout(wait).is_ok()
    }

    /// Request shutdown
    pub fn shutdown(&self) -> bool {
        self.send_command(PipelineCommand::Shutdown)
    }
}

/// The worker side of the pipeline, run on a dedicated thread
pub struct SerialPipeline {
    transport: Box<dyn SerialTransport>,
    datastream: Arc<Datastream>,
    command_receiver: Receiver<PipelineCommand>,
    idle_poll: Duration,
}

impl SerialPipeline {
    /// Create a pipeline and the handle that controls it
    pub fn new(
        transport: Box<dyn SerialTransport>,
        datastream: Arc<Datastream>,
        capture: &CaptureSettings,
    ) -> (Self, PipelineHandle) {
        let (cmd_tx, cmd_rx) = bounded(64);

        let pipeline = Self {
            transport,
            datastream,
            command_receiver: cmd_rx,
            idle_poll: capture.idle_poll(),
        };
        let handle = PipelineHandle {
            command_sender: cmd_tx,
        };

        (pipeline, handle)
    }

    /// Run the worker loop until shutdown
    pub fn run(self) {
        let mut worker = SerialWorker::new(
            self.transport,
            self.datastream,
            self.command_receiver,
            Arc::new(AtomicBool::new(true)),
            self.idle_poll,
        );
        worker.run();
    }
}
