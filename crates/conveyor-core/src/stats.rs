//! Thread-safe execution statistics.
//!
//! Counters are plain atomics with no lock hierarchy; a snapshot reads each
//! counter consistently but is not one instantaneous view of the whole set.
//! That tradeoff keeps the submission and dispatch paths contention-free and
//! is acceptable because snapshots feed observability, not decisions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::TaskError;

/// A point-in-time copy of the pool's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Executor threads currently alive.
    pub active_executors: usize,
    /// Tasks sitting in the queue at sampling time.
    pub queue_depth: usize,
    /// Tasks whose dispatch has finished (including failures, recovered
    /// panics, and pre-execution skips).
    pub completed: u64,
    /// Submissions refused for queue-full, admission timeout, or shutdown.
    pub rejected: u64,
    /// Mean task execution latency; zero until the first completion.
    pub mean_exec_time: Duration,
    /// The most recently observed task error, if any.
    pub last_error: Option<String>,
    /// Time elapsed since the pool was constructed.
    pub uptime: Duration,
}

/// Shared counter state behind the pool's statistics surface.
pub(crate) struct StatsCollector {
    metrics_enabled: bool,
    active_executors: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    busy_nanos: AtomicU64,
    last_error: Mutex<Option<String>>,
    started_at: Instant,
}

impl StatsCollector {
    pub(crate) fn new(metrics_enabled: bool) -> Self {
        Self {
            metrics_enabled,
            active_executors: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            busy_nanos: AtomicU64::new(0),
            last_error: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub(crate) fn executor_started(&self) {
        self.active_executors.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn executor_stopped(&self) {
        self.active_executors.fetch_sub(1, Ordering::AcqRel);
    }

    /// Record one finished dispatch and its latency.
    pub(crate) fn record_completion(&self, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        if self.metrics_enabled {
            // Saturating: u64 nanoseconds hold ~584 years of busy time.
            let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
            self.busy_nanos.fetch_add(nanos, Ordering::AcqRel);
        }
    }

    /// Record one refused admission.
    pub(crate) fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::AcqRel);
    }

    /// Store the most recent task error for observability.
    pub(crate) fn record_error(&self, error: &TaskError) {
        if self.metrics_enabled {
            *self.last_error.lock() = Some(error.to_string());
        }
    }

    /// Produce a value snapshot. Safe to call concurrently with any mutation.
    pub(crate) fn snapshot(&self, queue_depth: usize) -> PoolStats {
        let completed = self.completed.load(Ordering::Acquire);
        let busy_nanos = self.busy_nanos.load(Ordering::Acquire);
        let mean_exec_time = if completed > 0 {
            Duration::from_nanos(busy_nanos / completed)
        } else {
            Duration::ZERO
        };
        PoolStats {
            active_executors: self.active_executors.load(Ordering::Acquire),
            queue_depth,
            completed,
            rejected: self.rejected.load(Ordering::Acquire),
            mean_exec_time,
            last_error: self.last_error.lock().clone(),
            uptime: self.started_at.elapsed(),
        }
    }
}
