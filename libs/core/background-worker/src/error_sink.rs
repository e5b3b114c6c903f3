//! # Error sink: collects failures from background work off the request path.
//!
//! Background tasks and the dispatch worker report failures here instead of
//! propagating them. A single consumer hands each report to every observer.
//!
//! ## Architecture
//! ```text
//! report(origin, err) ──► [unbounded queue] ──► consumer ──► observer 1 (log)
//!   (never blocks)                                  ├──────► observer 2 (metrics)
//!                                                   └──────► panic → logged, next observer
//! ```
//!
//! ## Rules
//! - `report` never blocks and never fails; after the consumer is gone the
//!   report is logged inline.
//! - Reports are handled in the order they were accepted.
//! - Stopping drains every accepted report before the consumer exits.
//! - A panicking observer is isolated with `catch_unwind`.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::BackgroundError;
use crate::metrics;

/// A single failure reported by background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Which task or worker produced the failure.
    pub origin: Cow<'static, str>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(origin: impl Into<Cow<'static, str>>, message: impl Display) -> Self {
        Self {
            origin: origin.into(),
            message: message.to_string(),
            at: Utc::now(),
        }
    }
}

/// Receives every error report, in acceptance order.
#[async_trait]
pub trait ErrorObserver: Send + Sync + 'static {
    async fn on_error(&self, report: &ErrorReport);

    fn name(&self) -> &'static str;
}

/// Writes each report to the log at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

#[async_trait]
impl ErrorObserver for LogObserver {
    async fn on_error(&self, report: &ErrorReport) {
        error!(
            origin = %report.origin,
            at = %report.at.to_rfc3339(),
            error = %report.message,
            "Background task failed"
        );
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Counts reports per origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

#[async_trait]
impl ErrorObserver for MetricsObserver {
    async fn on_error(&self, report: &ErrorReport) {
        metrics::record_error_report(&report.origin);
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}

/// Keeps every report in memory. Handy in tests and health endpoints.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    reports: Mutex<Vec<ErrorReport>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports seen so far.
    pub async fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl ErrorObserver for CollectingObserver {
    async fn on_error(&self, report: &ErrorReport) {
        self.reports.lock().await.push(report.clone());
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Producer side of the error queue.
///
/// Cheap to clone and safe to call from any task.
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<ErrorReport>,
}

impl ErrorSink {
    /// Create the sink and its not-yet-running consumer.
    pub fn new() -> (Self, ErrorQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ErrorQueue { rx })
    }

    /// Report a failure. Never blocks the caller.
    pub fn report(&self, origin: impl Into<Cow<'static, str>>, err: impl Display) {
        self.submit(ErrorReport::new(origin, err));
    }

    /// Report an already built [`ErrorReport`].
    pub fn submit(&self, report: ErrorReport) {
        if let Err(mpsc::error::SendError(report)) = self.tx.send(report) {
            // Consumer already stopped; don't lose the failure.
            error!(
                origin = %report.origin,
                error = %report.message,
                "Background task failed after error sink closed"
            );
        }
    }

    /// Whether the consumer has stopped accepting reports.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the error queue, waiting for its observers.
pub struct ErrorQueue {
    rx: mpsc::UnboundedReceiver<ErrorReport>,
}

impl ErrorQueue {
    /// Start the consumer task that feeds every report to `observers`.
    pub fn spawn(self, observers: Vec<Arc<dyn ErrorObserver>>) -> ErrorSinkHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(
            observers = ?observers.iter().map(|o| o.name()).collect::<Vec<_>>(),
            "Starting error sink"
        );

        let join = tokio::spawn(run_consumer(self.rx, stop_rx, observers));
        ErrorSinkHandle {
            stop: stop_tx,
            join,
        }
    }
}

/// Handle owned by the shutdown sequence to stop the error consumer.
pub struct ErrorSinkHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl ErrorSinkHandle {
    /// Signal the consumer, let it handle every accepted report, and wait.
    ///
    /// Returns how many reports were handled over the sink's lifetime.
    pub async fn stop(self) -> Result<u64, BackgroundError> {
        let _ = self.stop.send(true);
        self.join.await.map_err(|e| BackgroundError::WorkerJoin {
            worker: "error_sink",
            details: e.to_string(),
        })
    }
}

async fn run_consumer(
    mut rx: mpsc::UnboundedReceiver<ErrorReport>,
    mut stop: watch::Receiver<bool>,
    observers: Vec<Arc<dyn ErrorObserver>>,
) -> u64 {
    let mut handled = 0u64;

    loop {
        tokio::select! {
            biased;
            report = rx.recv() => match report {
                Some(report) => {
                    notify(&observers, &report).await;
                    handled += 1;
                }
                None => break,
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    rx.close();
    while let Some(report) = rx.recv().await {
        notify(&observers, &report).await;
        handled += 1;
    }

    info!(handled, "Error sink stopped");
    handled
}

async fn notify(observers: &[Arc<dyn ErrorObserver>], report: &ErrorReport) {
    for observer in observers {
        let fut = observer.on_error(report);
        if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            };
            error!(
                observer = observer.name(),
                origin = %report.origin,
                panic = %info,
                "Error observer panicked"
            );
        }
    }
}
