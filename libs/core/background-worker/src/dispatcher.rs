//! Bounded dispatch queue with a single consuming worker.
//!
//! This module provides:
//! - `DispatchJob` trait for queued job payloads
//! - `JobProcessor` trait for whatever actually delivers a job
//! - `Dispatcher` (producer handle) and `DispatchQueue` (consumer side)
//! - `DispatcherHandle` to stop the worker once producers are gone
//!
//! Delivery is at-most-once: a failed job is reported to the [`ErrorSink`]
//! and dropped. The producer never learns the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::BackgroundError;
use crate::error_sink::ErrorSink;
use crate::metrics::{self, DeliveryStatus};

/// Trait for queued job payloads.
///
/// # Example
///
/// ```rust,ignore
/// impl DispatchJob for Message {
///     fn job_id(&self) -> String {
///         self.id().to_string()
///     }
/// }
/// ```
pub trait DispatchJob: Send + Sync + 'static {
    /// Returns the job ID for logging and tracking.
    fn job_id(&self) -> String;
}

/// Trait for job processors.
///
/// The dispatch worker calls `process` once per job, sequentially.
#[async_trait]
pub trait JobProcessor<J: DispatchJob>: Send + Sync + 'static {
    /// Error produced by a failed delivery; forwarded to the error sink.
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// Deliver a single job. No retry happens on `Err`.
    async fn process(&self, job: &J) -> Result<(), Self::Error>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;
}

/// Counts reported by a stopped dispatch worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: u64,
    pub failed: u64,
}

impl DispatchSummary {
    /// Jobs taken off the queue, whatever their outcome.
    pub fn consumed(&self) -> u64 {
        self.delivered + self.failed
    }
}

/// Producer side of a bounded dispatch queue.
///
/// Cheap to clone; all clones feed the same queue.
pub struct Dispatcher<J> {
    queue: &'static str,
    tx: mpsc::Sender<J>,
}

impl<J> Clone for Dispatcher<J> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue,
            tx: self.tx.clone(),
        }
    }
}

impl<J: DispatchJob> Dispatcher<J> {
    /// Create a queue holding at most `capacity` pending jobs.
    ///
    /// Nothing is consumed until [`DispatchQueue::spawn`] starts the worker.
    pub fn new(queue: &'static str, capacity: usize) -> (Self, DispatchQueue<J>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { queue, tx }, DispatchQueue { queue, rx })
    }

    /// Queue name used in logs and metrics.
    pub fn queue(&self) -> &'static str {
        self.queue
    }

    /// Hand a job to the worker.
    ///
    /// Waits while the queue is full and never drops the job. Fails only
    /// when shutdown has already closed the queue.
    pub async fn enqueue(&self, job: J) -> Result<(), BackgroundError> {
        let job_id = job.job_id();
        self.tx
            .send(job)
            .await
            .map_err(|_| BackgroundError::QueueClosed { queue: self.queue })?;

        metrics::record_job_enqueued(self.queue);
        debug!(queue = self.queue, job_id = %job_id, "Job enqueued");
        Ok(())
    }

    /// Free slots left before `enqueue` starts waiting.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether the consumer side has closed the queue.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of a dispatch queue, waiting to be given a processor.
pub struct DispatchQueue<J> {
    queue: &'static str,
    rx: mpsc::Receiver<J>,
}

impl<J: DispatchJob> DispatchQueue<J> {
    /// Start the single worker that drains this queue through `processor`.
    pub fn spawn<P>(self, processor: Arc<P>, errors: ErrorSink) -> DispatcherHandle
    where
        P: JobProcessor<J>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let queue = self.queue;

        info!(
            queue,
            processor = processor.name(),
            capacity = self.rx.max_capacity(),
            "Starting dispatch worker"
        );

        let join = tokio::spawn(run_worker(self.queue, self.rx, stop_rx, processor, errors));

        DispatcherHandle {
            queue,
            stop: stop_tx,
            join,
        }
    }
}

/// Handle owned by the shutdown sequence to stop a running dispatch worker.
pub struct DispatcherHandle {
    queue: &'static str,
    stop: watch::Sender<bool>,
    join: JoinHandle<DispatchSummary>,
}

impl DispatcherHandle {
    /// Queue this worker drains.
    pub fn queue(&self) -> &'static str {
        self.queue
    }

    /// Signal the worker, let it drain every queued job, and wait for it.
    ///
    /// The queue is closed to producers as part of this; only call it once no
    /// producer can still be enqueuing.
    pub async fn stop(self) -> Result<DispatchSummary, BackgroundError> {
        // A send error means the worker already exited; join reports why.
        let _ = self.stop.send(true);
        self.join.await.map_err(|e| BackgroundError::WorkerJoin {
            worker: self.queue,
            details: e.to_string(),
        })
    }
}

async fn run_worker<J, P>(
    queue: &'static str,
    mut rx: mpsc::Receiver<J>,
    mut stop: watch::Receiver<bool>,
    processor: Arc<P>,
    errors: ErrorSink,
) -> DispatchSummary
where
    J: DispatchJob,
    P: JobProcessor<J>,
{
    let mut summary = DispatchSummary::default();

    loop {
        tokio::select! {
            biased;
            job = rx.recv() => match job {
                Some(job) => deliver(queue, processor.as_ref(), &errors, &job, &mut summary).await,
                None => break,
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    // Refuse new jobs, then drain whatever was accepted before the close.
    rx.close();
    while let Some(job) = rx.recv().await {
        deliver(queue, processor.as_ref(), &errors, &job, &mut summary).await;
    }

    info!(
        queue,
        delivered = summary.delivered,
        failed = summary.failed,
        "Dispatch worker stopped"
    );
    summary
}

async fn deliver<J, P>(
    queue: &'static str,
    processor: &P,
    errors: &ErrorSink,
    job: &J,
    summary: &mut DispatchSummary,
) where
    J: DispatchJob,
    P: JobProcessor<J>,
{
    match processor.process(job).await {
        Ok(()) => {
            summary.delivered += 1;
            metrics::record_job_processed(queue, DeliveryStatus::Delivered);
            debug!(queue, job_id = %job.job_id(), "Job delivered");
        }
        Err(e) => {
            summary.failed += 1;
            metrics::record_job_processed(queue, DeliveryStatus::Failed);
            warn!(
                queue,
                job_id = %job.job_id(),
                processor = processor.name(),
                error = %e,
                "Job delivery failed, not retrying"
            );
            errors.report(processor.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_sink::{CollectingObserver, ErrorObserver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Mutex, Semaphore};

    #[derive(Debug, Clone, PartialEq)]
    struct TestJob(u32);

    impl DispatchJob for TestJob {
        fn job_id(&self) -> String {
            self.0.to_string()
        }
    }

    /// Processor that records jobs, optionally failing odd ones and waiting on a gate.
    struct RecordingProcessor {
        seen: Mutex<Vec<u32>>,
        attempts: AtomicUsize,
        fail_odd: bool,
        gate: Option<Arc<Semaphore>>,
    }

    impl RecordingProcessor {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                fail_odd: false,
                gate: None,
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl JobProcessor<TestJob> for RecordingProcessor {
        type Error = String;

        async fn process(&self, job: &TestJob) -> Result<(), String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.map_err(|e| e.to_string())?.forget();
            }
            if self.fail_odd && job.0 % 2 == 1 {
                return Err(format!("job {} rejected", job.0));
            }
            self.seen.lock().await.push(job.0);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn error_sink() -> (ErrorSink, crate::ErrorSinkHandle, Arc<CollectingObserver>) {
        let collector = Arc::new(CollectingObserver::new());
        let (sink, queue) = ErrorSink::new();
        let observers: Vec<Arc<dyn ErrorObserver>> = vec![collector.clone()];
        (sink, queue.spawn(observers), collector)
    }

    #[tokio::test]
    async fn test_jobs_delivered_in_order() {
        let (errors, _sink_handle, _) = error_sink();
        let processor = Arc::new(RecordingProcessor::new());
        let (dispatcher, queue) = Dispatcher::new("test", 10);
        let handle = queue.spawn(Arc::clone(&processor), errors);

        for i in 0..5 {
            dispatcher.enqueue(TestJob(i)).await.unwrap();
        }

        let summary = handle.stop().await.unwrap();
        assert_eq!(summary.delivered, 5);
        assert_eq!(*processor.seen.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_enqueue_blocks_when_full_and_resumes_one_slot_at_a_time() {
        let (errors, _sink_handle, _) = error_sink();
        let gate = Arc::new(Semaphore::new(0));
        let processor = Arc::new(RecordingProcessor::gated(Arc::clone(&gate)));
        let (dispatcher, queue) = Dispatcher::new("test", 1);
        let handle = queue.spawn(Arc::clone(&processor), errors);

        // Job 0 is taken by the worker and parks on the gate; job 1 fills the slot.
        dispatcher.enqueue(TestJob(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.enqueue(TestJob(1)).await.unwrap();
        assert_eq!(dispatcher.available(), 0);

        let blocked_a = {
            let d = dispatcher.clone();
            tokio::spawn(async move { d.enqueue(TestJob(2)).await })
        };
        let blocked_b = {
            let d = dispatcher.clone();
            tokio::spawn(async move { d.enqueue(TestJob(3)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked_a.is_finished());
        assert!(!blocked_b.is_finished());

        // Finishing job 0 lets the worker pull job 1, freeing exactly one slot.
        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let unblocked = [blocked_a.is_finished(), blocked_b.is_finished()]
            .iter()
            .filter(|done| **done)
            .count();
        assert_eq!(unblocked, 1);

        gate.add_permits(10);
        blocked_a.await.unwrap().unwrap();
        blocked_b.await.unwrap().unwrap();

        let summary = handle.stop().await.unwrap();
        assert_eq!(summary.delivered, 4);
    }

    #[tokio::test]
    async fn test_stop_drains_pending_jobs() {
        let (errors, _sink_handle, _) = error_sink();
        let gate = Arc::new(Semaphore::new(0));
        let processor = Arc::new(RecordingProcessor::gated(Arc::clone(&gate)));
        let (dispatcher, queue) = Dispatcher::new("test", 10);
        let handle = queue.spawn(Arc::clone(&processor), errors);

        for i in 0..6 {
            dispatcher.enqueue(TestJob(i)).await.unwrap();
        }

        let stopping = tokio::spawn(handle.stop());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stopping.is_finished());

        gate.add_permits(6);
        let summary = stopping.await.unwrap().unwrap();
        assert_eq!(summary.consumed(), 6);
        assert_eq!(processor.seen.lock().await.len(), 6);

        // The queue is closed once the worker is gone.
        assert_eq!(
            dispatcher.enqueue(TestJob(99)).await,
            Err(BackgroundError::QueueClosed { queue: "test" })
        );
    }

    #[tokio::test]
    async fn test_failures_reported_once_without_retry() {
        let (errors, sink_handle, collector) = error_sink();
        let processor = Arc::new(RecordingProcessor {
            fail_odd: true,
            ..RecordingProcessor::new()
        });
        let (dispatcher, queue) = Dispatcher::new("test", 10);
        let handle = queue.spawn(Arc::clone(&processor), errors);

        for i in 0..4 {
            dispatcher.enqueue(TestJob(i)).await.unwrap();
        }

        let summary = handle.stop().await.unwrap();
        assert_eq!(summary, DispatchSummary { delivered: 2, failed: 2 });
        assert_eq!(processor.attempts.load(Ordering::SeqCst), 4);

        sink_handle.stop().await.unwrap();
        let reports = collector.reports().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.origin == "recording"));
        assert!(reports[0].message.contains("job 1 rejected"));
    }
}
