//! Counting barriers for in-flight work and live executors.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cancellation::CancellationToken;

/// How often a cancellable wait re-checks its scope.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A reusable counting barrier.
///
/// The count rises with [`WaitGroup::add`] and falls with
/// [`WaitGroup::done`]; waiters block until it reaches zero. Unlike a
/// one-shot barrier the count may rise again after draining, so the same
/// group can track in-flight work across the pool's whole lifetime.
pub(crate) struct WaitGroup {
    count: Mutex<usize>,
    zero: Condvar,
}

impl WaitGroup {
    pub(crate) fn new() -> Self {
        Self {
            count: Mutex::new(0),
            zero: Condvar::new(),
        }
    }

    /// Raise the count by `n`.
    pub(crate) fn add(&self, n: usize) {
        *self.count.lock() += n;
    }

    /// Lower the count by one, waking waiters when it reaches zero.
    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "done() without a matching add()");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// The current count.
    pub(crate) fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Block until the count reaches zero.
    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Block until the count reaches zero or the timeout elapses.
    ///
    /// Returns `true` if the count drained within the deadline.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.zero.wait_for(&mut count, deadline - now);
        }
        true
    }

    /// Block until the count reaches zero or the scope is cancelled.
    ///
    /// Returns `true` if the count drained first. Re-checks the scope on a
    /// short interval so cancellation cuts the wait off promptly.
    pub(crate) fn wait_cancelled(&self, scope: &CancellationToken) -> bool {
        let mut count = self.count.lock();
        loop {
            if *count == 0 {
                return true;
            }
            if scope.is_cancelled() {
                return false;
            }
            self.zero.wait_for(&mut count, CANCEL_POLL_INTERVAL);
        }
    }
}
