//! Background worker error types
//!
//! Only conditions a caller can act on live here. Breaking the
//! register/complete pairing of the task counter is a defect and panics
//! instead of producing one of these.

use thiserror::Error;

/// Errors surfaced by the supervisor, the dispatch queue and shutdown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackgroundError {
    /// A task was submitted after shutdown started draining.
    #[error("task supervisor is draining, refusing to start task '{task}'")]
    Draining { task: String },

    /// A job was enqueued after the queue was closed by shutdown.
    #[error("queue '{queue}' is closed")]
    QueueClosed { queue: &'static str },

    /// A worker task panicked or was aborted before it could finish.
    #[error("worker '{worker}' did not exit cleanly: {details}")]
    WorkerJoin { worker: &'static str, details: String },

    /// The termination signal handler could not be installed.
    #[error("failed to listen for termination signal: {details}")]
    Signal { details: String },
}

impl BackgroundError {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BackgroundError::Draining { .. } => "draining",
            BackgroundError::QueueClosed { .. } => "queue_closed",
            BackgroundError::WorkerJoin { .. } => "worker_join",
            BackgroundError::Signal { .. } => "signal",
        }
    }
}
