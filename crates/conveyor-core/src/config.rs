//! Worker pool configuration.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{PoolError, TaskError};

/// Default capacity for the pool's task queue.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default upper bound on graceful termination.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A shared hook invoked for every task-level failure.
///
/// Receives the structured [`TaskError`] for returned errors, pre-execution
/// cancellations, and recovered panics. Invoked on executor threads (and on
/// the terminating thread for tasks rejected at shutdown); it should not
/// block and must not call back into the pool's termination entry points.
pub type FailureCallback = Arc<dyn Fn(TaskError) + Send + Sync + 'static>;

/// Configuration for creating a [`WorkerPool`](crate::WorkerPool).
///
/// Immutable once the pool is constructed. Validation happens at
/// construction; an executor count of zero rejects the pool with
/// [`PoolError::InvalidConfig`]. Queue capacity and shutdown timeout are
/// unsigned types, so the remaining range checks hold by construction.
#[derive(Clone)]
pub struct PoolConfig {
    /// Number of executor threads. Must be at least 1.
    pub executors: usize,
    /// Task queue capacity. Zero means an unbuffered rendezvous queue.
    pub queue_capacity: usize,
    /// Upper bound on graceful termination. Zero forces immediate shutdown.
    pub shutdown_timeout: Duration,
    /// Optional hook receiving every task-level failure.
    pub on_failure: Option<FailureCallback>,
    /// When false, non-essential counter work (latency accumulation, the
    /// last-error slot) is elided.
    pub metrics_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            executors: thread::available_parallelism().map_or(1, usize::from),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            on_failure: None,
            metrics_enabled: true,
        }
    }
}

impl PoolConfig {
    /// Set the executor thread count.
    pub fn with_executors(mut self, executors: usize) -> Self {
        self.executors = executors;
        self
    }

    /// Set the task queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the upper bound on graceful termination.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Install a failure callback.
    pub fn with_failure_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(TaskError) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    /// Enable or disable non-essential metrics collection.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Validate the configuration.
    pub(crate) fn validate(&self) -> Result<(), PoolError> {
        if self.executors == 0 {
            return Err(PoolError::InvalidConfig(
                "executor count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("executors", &self.executors)
            .field("queue_capacity", &self.queue_capacity)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("on_failure", &self.on_failure.is_some())
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}
