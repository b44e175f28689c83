//! Controller actor.
//!
//! The [`TrafficStateMachine`] lives on one blocking thread and is fed from a
//! single bounded queue. Everything else (UDP receiver, replay, HTTP
//! handlers) holds a cloneable [`ControllerHandle`].
//!
//! ```text
//!   scans ──try_send──┐
//!                     ├──► mpsc ──► blocking thread ──► TrafficStateMachine
//!   triggers ──send───┘                   │
//!        │                                └──► Arc<RwLock<ControllerStatus>>
//!        └── STOP raises the AbortHandle first
//! ```

use log::{debug, error, info, trace};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_graceful_shutdown::SubsystemHandle;

use marshal_core::{
    AbortHandle, Clock, ControllerConfig, ControllerStatus, IndicatorSink, MotionSink,
    NotificationSink, NotifyError, TrafficStateMachine, TriggerCommand, TriggerOutcome,
};

use crate::MarshalError;

/// Scans waiting while a maneuver blocks the controller thread.
pub const QUEUE_CAPACITY: usize = 16;

/// Creates the notifier on the controller thread.
pub type NotifierFactory =
    Box<dyn FnOnce() -> Result<Box<dyn NotificationSink>, NotifyError> + Send>;

#[derive(Debug)]
pub enum ControllerMessage {
    Scan(Vec<f32>),
    Trigger(TriggerCommand),
    Shutdown,
}

/// Output devices handed to the controller thread.
pub struct Outputs {
    pub indicator: Box<dyn IndicatorSink>,
    pub motion: Box<dyn MotionSink>,
    pub notifier: Option<NotifierFactory>,
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerMessage>,
    abort: AbortHandle,
    status: Arc<RwLock<ControllerStatus>>,
}

impl ControllerHandle {
    /// Queue a scan. A full queue drops the scan; only a stopped controller
    /// is an error.
    pub fn submit_scan(&self, ranges: Vec<f32>) -> Result<(), MarshalError> {
        match self.tx.try_send(ControllerMessage::Scan(ranges)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Controller busy, dropping scan");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MarshalError::ControllerGone),
        }
    }

    /// Parse and queue a trigger message. Unknown text is ignored.
    pub async fn trigger(&self, text: &str) -> Result<TriggerOutcome, MarshalError> {
        let Some(command) = TriggerCommand::parse(text) else {
            debug!("Ignoring unknown trigger '{}'", text.trim());
            return Ok(TriggerOutcome::Ignored);
        };
        if command == TriggerCommand::Stop {
            // Cut a running maneuver short before STOP reaches the queue
            self.abort.abort();
        }
        self.tx
            .send(ControllerMessage::Trigger(command))
            .await
            .map_err(|_| MarshalError::ControllerGone)?;
        Ok(TriggerOutcome::Applied(command))
    }

    /// Latest status snapshot.
    pub fn status(&self) -> ControllerStatus {
        self.status.read().unwrap().clone()
    }

    /// Ask the controller thread to finish, aborting any maneuver.
    ///
    /// The abort is raised before the shutdown message is queued, so a scan
    /// still waiting in the queue cannot start a new leg either.
    pub async fn shutdown(&self) {
        self.abort.abort();
        let _ = self.tx.send(ControllerMessage::Shutdown).await;
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("aborted", &self.abort.is_aborted())
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish()
    }
}

// =============================================================================
// Actor
// =============================================================================

struct Worker {
    config: ControllerConfig,
    clock: Arc<dyn Clock>,
    outputs: Outputs,
    rx: mpsc::Receiver<ControllerMessage>,
    abort: AbortHandle,
    status: Arc<RwLock<ControllerStatus>>,
}

impl Worker {
    fn run_blocking(mut self) -> Result<(), MarshalError> {
        let notifier = self.outputs.notifier.take().and_then(|connect| match connect() {
            Ok(sink) => Some(sink),
            Err(e) => {
                error!("Notifications disabled: {}", e);
                None
            }
        });

        let Outputs {
            indicator, motion, ..
        } = self.outputs;
        let mut machine =
            TrafficStateMachine::new(self.config, self.clock, indicator, notifier, motion)
                .with_abort_handle(self.abort);
        let leg_status = self.status.clone();
        machine = machine.with_status_listener(Box::new(move |status| {
            *leg_status.write().unwrap() = status.clone();
        }));
        *self.status.write().unwrap() = machine.status();
        info!("System Ready");

        while let Some(message) = self.rx.blocking_recv() {
            match message {
                ControllerMessage::Scan(ranges) => {
                    machine.on_scan(&ranges);
                }
                ControllerMessage::Trigger(command) => machine.on_external_trigger(command),
                ControllerMessage::Shutdown => break,
            }
            *self.status.write().unwrap() = machine.status();
        }

        machine.shutdown();
        Ok(())
    }
}

pub struct Controller {
    worker: Worker,
    handle: ControllerHandle,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
        outputs: Outputs,
    ) -> (Controller, ControllerHandle) {
        Self::with_capacity(config, clock, outputs, QUEUE_CAPACITY)
    }

    fn with_capacity(
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
        outputs: Outputs,
        capacity: usize,
    ) -> (Controller, ControllerHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let abort = AbortHandle::new();
        let status = Arc::new(RwLock::new(ControllerStatus::default()));
        let handle = ControllerHandle {
            tx,
            abort: abort.clone(),
            status: status.clone(),
        };
        let worker = Worker {
            config,
            clock,
            outputs,
            rx,
            abort,
            status,
        };
        (
            Controller {
                worker,
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Run the controller thread until shutdown is requested.
    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), MarshalError> {
        let Controller { worker, handle } = self;
        let mut thread = tokio::task::spawn_blocking(move || worker.run_blocking());

        let joined = tokio::select! {
            _ = subsys.on_shutdown_requested() => {
                info!("Controller: Shutdown requested");
                handle.shutdown().await;
                thread.await
            }
            r = &mut thread => r,
        };

        joined.map_err(|e| {
            error!("Controller thread failed: {}", e);
            MarshalError::ControllerGone
        })?
    }
}

// =============================================================================
// Tests
// =============================================================================
