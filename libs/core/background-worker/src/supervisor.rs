//! # Task supervisor: the in-flight task counter that gates shutdown.
//!
//! Every unit of background work is registered before it is launched and
//! completed when it exits, whether it succeeded, failed or panicked.
//! Shutdown waits for the counter to reach zero before it stops the workers
//! those tasks feed.
//!
//! ## Architecture
//! ```text
//! spawn(name, fut)
//!   ├─► register(name)        counter += 1   (refused while draining)
//!   │        └─► TaskGuard
//!   └─► tokio::spawn
//!          ├─► acquire permit (only with a concurrency cap)
//!          ├─► fut.await
//!          └─► drop(TaskGuard)   counter -= 1 (also on panic unwind)
//!
//! begin_draining() ─► no new registrations
//! wait_until_zero() ─► resolves once counter == 0
//! ```
//!
//! ## Rules
//! - Pairing is structural: the only way to decrement is dropping a guard.
//! - The draining flag and the counter share one lock, so a registration
//!   can never slip in after `wait_until_zero` observed zero.
//! - Underflow is a defect and panics.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BackgroundError;
use crate::metrics;

/// Counter state guarded by the watch channel's lock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TaskCount {
    active: usize,
    draining: bool,
}

struct Inner {
    count: watch::Sender<TaskCount>,
    semaphore: Option<Arc<Semaphore>>,
}

impl Inner {
    fn complete(&self, task: &str) {
        let mut remaining = 0;
        self.count.send_modify(|count| {
            assert!(
                count.active > 0,
                "task counter underflow while completing '{task}'"
            );
            count.active -= 1;
            remaining = count.active;
        });
        metrics::set_active_tasks(remaining);
        debug!(task = %task, active = remaining, "Background task completed");
    }
}

/// Shared handle to the task counter.
///
/// Cheap to clone; every clone observes the same counter.
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

impl TaskSupervisor {
    /// Creates a supervisor. `max_concurrent` caps how many spawned tasks run
    /// at once; tasks over the cap are registered immediately and wait for a
    /// permit.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        let (count, _) = watch::channel(TaskCount::default());
        let semaphore = max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            inner: Arc::new(Inner { count, semaphore }),
        }
    }

    /// Registers one unit of work and returns the guard that completes it.
    ///
    /// Fails with [`BackgroundError::Draining`] once shutdown has begun.
    pub fn register(&self, task: impl Into<Cow<'static, str>>) -> Result<TaskGuard, BackgroundError> {
        let task = task.into();
        let mut active = 0;
        let accepted = self.inner.count.send_if_modified(|count| {
            if count.draining {
                return false;
            }
            count.active += 1;
            active = count.active;
            true
        });

        if !accepted {
            metrics::record_task_rejected(&task);
            warn!(task = %task, "Refusing background task, shutdown in progress");
            return Err(BackgroundError::Draining {
                task: task.into_owned(),
            });
        }

        metrics::record_task_registered(&task);
        metrics::set_active_tasks(active);
        debug!(task = %task, active, "Background task registered");

        Ok(TaskGuard {
            inner: Arc::clone(&self.inner),
            task,
        })
    }

    /// Registers and launches `work` as a tracked tokio task.
    ///
    /// The counter is incremented before this returns and decremented when
    /// `work` finishes or panics.
    pub fn spawn<F>(
        &self,
        task: impl Into<Cow<'static, str>>,
        work: F,
    ) -> Result<JoinHandle<()>, BackgroundError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.register(task)?;
        let semaphore = self.inner.semaphore.clone();

        Ok(tokio::spawn(async move {
            let _permit = acquire_permit(semaphore).await;
            work.await;
            guard.complete();
        }))
    }

    /// Number of registered tasks that have not completed yet.
    pub fn active(&self) -> usize {
        self.inner.count.borrow().active
    }

    /// Whether new registrations are being refused.
    pub fn is_draining(&self) -> bool {
        self.inner.count.borrow().draining
    }

    /// Stops accepting registrations. Idempotent.
    pub fn begin_draining(&self) {
        self.inner.count.send_if_modified(|count| {
            if count.draining {
                return false;
            }
            count.draining = true;
            true
        });
    }

    /// Resolves once no registered task is outstanding.
    ///
    /// Returns immediately when the counter is already zero. Meant for the
    /// shutdown sequence; call [`begin_draining`](Self::begin_draining) first
    /// or new tasks may keep it waiting.
    pub async fn wait_until_zero(&self) {
        let mut rx = self.inner.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| count.active == 0).await;
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(None)
    }
}

async fn acquire_permit(semaphore: Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
    match semaphore {
        // The semaphore is never closed; a closed one simply stops limiting.
        Some(sem) => sem.acquire_owned().await.ok(),
        None => None,
    }
}

/// Proof of one registration. Completing or dropping it decrements the
/// counter exactly once.
#[must_use = "dropping the guard completes the task immediately"]
pub struct TaskGuard {
    inner: Arc<Inner>,
    task: Cow<'static, str>,
}

impl TaskGuard {
    /// Name the task was registered under.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Marks the unit of work as finished.
    pub fn complete(self) {
        drop(self);
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.inner.complete(&self.task);
    }
}

impl std::fmt::Debug for TaskGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGuard").field("task", &self.task).finish()
    }
}
