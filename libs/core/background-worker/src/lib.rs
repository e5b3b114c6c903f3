//! Background Worker Framework
//!
//! The in-process machinery behind the members site's fire-and-forget work:
//! tracked tasks, one bounded outgoing queue drained by a single worker, a
//! shared error sink, and a shutdown sequence that tears everything down in
//! dependency order.
//!
//! ## Architecture
//!
//! ```text
//! request handler
//!   └─► TaskSupervisor::spawn("invoice") ─┐      (counter +1 before launch)
//!   └─► TaskSupervisor::spawn("manual")  ─┤
//!                                         ▼
//!                           Dispatcher::enqueue(job)   (bounded, blocks when full)
//!                                         ▼
//!                           dispatch worker ──► JobProcessor::process(job)
//!                                         │
//!   task failures ────────────────────────┴─► ErrorSink::report(..)
//!                                                     ▼
//!                                          error sink worker ──► ErrorObserver(s)
//!
//! SIGINT/SIGTERM ─► ShutdownSequence::shutdown()
//!   Running ─► Draining (refuse new tasks, wait for counter == 0)
//!           ─► Stopping (stop dispatcher, then error sink)
//!           ─► Closed
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use background_worker::{Dispatcher, ErrorSink, LogObserver, ShutdownSequence, TaskSupervisor};
//!
//! let supervisor = TaskSupervisor::new(None);
//! let (errors, error_queue) = ErrorSink::new();
//! let error_handle = error_queue.spawn(vec![Arc::new(LogObserver)]);
//! let (mailer, mail_queue) = Dispatcher::new("mail", 100);
//! let mail_handle = mail_queue.spawn(processor, errors.clone());
//!
//! let shutdown = ShutdownSequence::new(supervisor.clone(), mail_handle, error_handle);
//! supervisor.spawn("invoice", async move { mailer.enqueue(job).await.ok(); })?;
//! shutdown.shutdown_on_signal().await?;
//! ```

mod config;
mod dispatcher;
mod error;
mod error_sink;
pub mod metrics;
mod shutdown;
pub mod signal;
mod supervisor;

// Re-export main types
pub use config::{BackgroundConfig, DEFAULT_QUEUE_CAPACITY};
pub use dispatcher::{
    DispatchJob, DispatchQueue, DispatchSummary, Dispatcher, DispatcherHandle, JobProcessor,
};
pub use error::BackgroundError;
pub use error_sink::{
    CollectingObserver, ErrorObserver, ErrorQueue, ErrorReport, ErrorSink, ErrorSinkHandle,
    LogObserver, MetricsObserver,
};
pub use shutdown::{ShutdownSequence, ShutdownState, ShutdownSummary};
pub use supervisor::{TaskGuard, TaskSupervisor};
