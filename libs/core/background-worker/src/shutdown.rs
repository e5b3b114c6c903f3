//! # Ordered, single-shot shutdown of the background subsystem.
//!
//! ```text
//! Running ──signal / shutdown()──► Draining ──counter == 0──► Stopping ──► Closed
//!                                     │                          ├─ stop dispatcher (drain + join)
//!                                     │                          └─ stop error sink (drain + join)
//!                                     └─ new registrations refused
//! ```
//!
//! The error sink is stopped last because both the tasks and the dispatcher
//! may still report into it. Once started, the sequence runs to completion
//! even if the caller stops waiting on it.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{error, info};

use crate::dispatcher::{DispatchSummary, DispatcherHandle};
use crate::error::BackgroundError;
use crate::error_sink::ErrorSinkHandle;
use crate::signal;
use crate::supervisor::TaskSupervisor;

/// Where the shutdown sequence currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopping,
    Closed,
}

impl ShutdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining => "draining",
            ShutdownState::Stopping => "stopping",
            ShutdownState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the workers had done by the time they stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub dispatch: DispatchSummary,
    pub errors_handled: u64,
}

struct Workers {
    dispatcher: DispatcherHandle,
    errors: ErrorSinkHandle,
}

/// Owns the worker handles and stops them in order, exactly once.
pub struct ShutdownSequence {
    supervisor: TaskSupervisor,
    state: Arc<watch::Sender<ShutdownState>>,
    workers: Mutex<Option<Workers>>,
}

impl ShutdownSequence {
    pub fn new(
        supervisor: TaskSupervisor,
        dispatcher: DispatcherHandle,
        errors: ErrorSinkHandle,
    ) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            supervisor,
            state: Arc::new(state),
            workers: Mutex::new(Some(Workers { dispatcher, errors })),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Run the shutdown sequence and wait for it to reach `Closed`.
    ///
    /// The first call returns the worker summary. Later or concurrent calls
    /// wait for the same sequence to finish and return `Ok(None)`.
    pub async fn shutdown(&self) -> Result<Option<ShutdownSummary>, BackgroundError> {
        let workers = self.workers.lock().await.take();

        let Some(workers) = workers else {
            let mut rx = self.state.subscribe();
            // Sender is owned by `self`; the channel stays open.
            let _ = rx.wait_for(|s| *s == ShutdownState::Closed).await;
            return Ok(None);
        };

        let supervisor = self.supervisor.clone();
        let state = Arc::clone(&self.state);
        let sequence = tokio::spawn(run_sequence(supervisor, state, workers));

        sequence
            .await
            .map_err(|e| BackgroundError::WorkerJoin {
                worker: "shutdown",
                details: e.to_string(),
            })?
            .map(Some)
    }

    /// Wait for SIGINT/SIGTERM, then run [`shutdown`](Self::shutdown).
    pub async fn shutdown_on_signal(&self) -> Result<Option<ShutdownSummary>, BackgroundError> {
        signal::wait_for_signal()
            .await
            .map_err(|e| BackgroundError::Signal {
                details: e.to_string(),
            })?;
        self.shutdown().await
    }
}

async fn run_sequence(
    supervisor: TaskSupervisor,
    state: Arc<watch::Sender<ShutdownState>>,
    workers: Workers,
) -> Result<ShutdownSummary, BackgroundError> {
    state.send_replace(ShutdownState::Draining);
    supervisor.begin_draining();
    info!(active = supervisor.active(), "Draining background tasks");

    supervisor.wait_until_zero().await;

    state.send_replace(ShutdownState::Stopping);
    info!("Background tasks finished, stopping workers");

    // The error sink must outlive the dispatcher even if the dispatcher
    // worker died, so its result is checked only after both are stopped.
    let dispatch = workers.dispatcher.stop().await;
    if let Err(e) = &dispatch {
        error!(error = %e, "Dispatcher did not stop cleanly");
    }
    let errors = workers.errors.stop().await;
    if let Err(e) = &errors {
        error!(error = %e, "Error sink did not stop cleanly");
    }

    state.send_replace(ShutdownState::Closed);

    let summary = ShutdownSummary {
        dispatch: dispatch?,
        errors_handled: errors?,
    };
    info!(
        delivered = summary.dispatch.delivered,
        failed = summary.dispatch.failed,
        errors_handled = summary.errors_handled,
        "Background subsystem closed"
    );
    Ok(summary)
}
