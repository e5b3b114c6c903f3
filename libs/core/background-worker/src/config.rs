//! Background worker configuration
//!
//! This module provides `BackgroundConfig` for sizing the dispatch queue and
//! the task pool.

/// Default number of jobs the outgoing queue holds before producers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Configuration for the background worker components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundConfig {
    /// Capacity of the bounded dispatch queue (min 1)
    pub queue_capacity: usize,

    /// Maximum tasks running at once (0 = unlimited)
    pub max_concurrent_tasks: usize,
}

impl BackgroundConfig {
    /// Create a config with the default queue capacity and no task cap
    pub fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrent_tasks: 0,
        }
    }

    /// Set the dispatch queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the maximum number of concurrently running tasks (0 = unlimited)
    pub fn with_max_concurrent_tasks(mut self, count: usize) -> Self {
        self.max_concurrent_tasks = count;
        self
    }

    /// Returns the task concurrency cap, `None` when unlimited.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self.max_concurrent_tasks {
            0 => None,
            n => Some(n),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self::new()
    }
}
