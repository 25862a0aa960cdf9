//! Run configuration.

use crate::error::{WorkerError, WorkerResult};

/// What a sender does when the outbound queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for room (back-pressures the sender).
    #[default]
    Block,
    /// Return [`WorkerError::QueueFull`].
    Fail,
}

/// Configuration for a local worker/collector run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Number of workers feeding the collector.
    pub num_workers: usize,
    /// Capacity of the worker-to-collector queue, in frames.
    pub queue_capacity: usize,
    /// Behavior of a full queue.
    pub overflow: OverflowPolicy,
}

impl RunConfig {
    /// Creates a configuration for `num_workers` workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            queue_capacity: 1024,
            overflow: OverflowPolicy::Block,
        }
    }

    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the overflow policy.
    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] for zero workers or zero capacity.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.num_workers == 0 {
            return Err(WorkerError::config("num_workers must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(WorkerError::config("queue_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(1)
    }
}
