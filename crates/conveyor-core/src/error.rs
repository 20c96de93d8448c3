//! Error types for the Conveyor execution engine.

use std::any::Any;
use std::backtrace::Backtrace;

use crate::task::TaskId;

/// A boxed error suitable for crossing thread boundaries.
///
/// Task work functions report failures as this type so callers can return
/// any error with `?` inside a submitted closure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors surfaced by pool construction, admission, and termination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool has begun termination and admits no further tasks.
    #[error("pool is closed")]
    Closed,

    /// The task queue is at capacity and the submission did not block.
    #[error("task queue is full")]
    QueueFull,

    /// The admission deadline expired before queue space became available.
    #[error("timed out waiting for queue space")]
    Timeout,

    /// The supplied configuration failed validation; no pool was created.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The shutdown deadline expired with executor threads still running.
    ///
    /// Surviving executors are leaked until their current task returns; the
    /// pool does not interrupt running work.
    #[error("shutdown deadline expired with executors still running")]
    ForcedShutdown,
}

/// A failure raised by one task, delivered through the failure callback.
///
/// Carries the task identifier alongside the underlying error so callers can
/// pattern-match via [`std::error::Error::source`] without losing context.
/// For failures recovered from a panic, [`TaskError::trace`] holds the stack
/// trace captured at the recovery point.
#[derive(Debug, thiserror::Error)]
#[error("task {task_id} failed: {source}")]
pub struct TaskError {
    task_id: TaskId,
    #[source]
    source: BoxError,
    trace: Option<String>,
}

impl TaskError {
    /// Wrap an error returned by the task's work function.
    pub(crate) fn failed(task_id: TaskId, source: BoxError) -> Self {
        Self {
            task_id,
            source,
            trace: None,
        }
    }

    /// Record a task skipped because its scope was cancelled before dispatch.
    pub(crate) fn cancelled(task_id: TaskId, cause: Option<String>) -> Self {
        let cause = cause.unwrap_or_else(|| "task cancelled before execution".to_string());
        Self {
            task_id,
            source: cause.into(),
            trace: None,
        }
    }

    /// Wrap a panic payload recovered while the task was running.
    pub(crate) fn panicked(
        task_id: TaskId,
        payload: Box<dyn Any + Send>,
        trace: Backtrace,
    ) -> Self {
        Self {
            task_id,
            source: format!("panic: {}", panic_message(payload.as_ref())).into(),
            trace: Some(trace.to_string()),
        }
    }

    /// The identifier of the task that failed.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// The stack trace captured when a panic was recovered.
    ///
    /// `None` for errors returned by the work function and for
    /// pre-execution cancellations.
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Consume the error, yielding the underlying cause.
    pub fn into_source(self) -> BoxError {
        self.source
    }
}

/// Best-effort extraction of a human-readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_messages() {
        assert_eq!(PoolError::Closed.to_string(), "pool is closed");
        assert_eq!(PoolError::QueueFull.to_string(), "task queue is full");
        assert_eq!(
            PoolError::InvalidConfig("executor count must be at least 1".to_string()).to_string(),
            "invalid pool configuration: executor count must be at least 1"
        );
    }

    #[test]
    fn test_task_error_exposes_source() {
        let id = TaskId::next();
        let err = TaskError::failed(id, "disk offline".into());
        assert_eq!(err.task_id(), id);
        assert!(err.to_string().contains("disk offline"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.trace().is_none());
    }

    #[test]
    fn test_panic_payload_messages() {
        let static_payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(static_payload.as_ref()), "boom");

        let owned_payload: Box<dyn Any + Send> = Box::new("kaboom".to_string());
        assert_eq!(panic_message(owned_payload.as_ref()), "kaboom");

        let opaque_payload: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(opaque_payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_panicked_error_carries_trace() {
        let err = TaskError::panicked(
            TaskId::next(),
            Box::new("boom"),
            Backtrace::force_capture(),
        );
        assert!(err.to_string().contains("panic: boom"));
        assert!(err.trace().is_some());
    }

    #[test]
    fn test_cancelled_default_cause() {
        let err = TaskError::cancelled(TaskId::next(), None);
        assert!(err.to_string().contains("cancelled before execution"));

        let err = TaskError::cancelled(TaskId::next(), Some("tenant quota revoked".to_string()));
        assert!(err.to_string().contains("tenant quota revoked"));
    }
}
