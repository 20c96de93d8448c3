//! Task records and identifier generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::cancellation::CancellationToken;
use crate::error::BoxError;

/// Counter for unique task IDs. Never resets during the process lifetime.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A unique, monotonically-increasing task identifier.
///
/// Displays as a short prefixed string, e.g. `task-42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value of this task ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Priority labels for submitted tasks.
///
/// The label is carried on the task record for observability and for higher
/// layers to act on; the core dispatches in FIFO admission order and does
/// not reorder by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum TaskPriority {
    /// Low priority - background maintenance work.
    Low = 0,
    /// Normal priority - default for most tasks.
    #[default]
    Normal = 1,
    /// High priority - time-sensitive work.
    High = 2,
}

/// A boxed work function reporting success or failure.
pub(crate) type TaskFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// One submitted unit of work.
///
/// Owned by the queue from admission until an executor dequeues it; consumed
/// by dispatch.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) work: TaskFn,
    pub(crate) priority: TaskPriority,
    pub(crate) scope: CancellationToken,
    pub(crate) created_at: Instant,
}

impl Task {
    /// Build a task record with a fresh identifier.
    ///
    /// A missing scope is normalized to a fresh token no caller holds a
    /// handle to, so dispatch never has to special-case an absent scope.
    pub(crate) fn new(work: TaskFn, priority: TaskPriority, scope: Option<CancellationToken>) -> Self {
        Self {
            id: TaskId::next(),
            work,
            priority,
            scope: scope.unwrap_or_default(),
            created_at: Instant::now(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
