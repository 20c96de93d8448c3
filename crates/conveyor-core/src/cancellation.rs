//! Cooperative cancellation scopes.
//!
//! A [`CancellationToken`] signals that work associated with it should cease.
//! Tasks consult their scope before execution begins; once a task body is
//! running, honoring cancellation is the task author's responsibility.
//!
//! Internally the token pairs an atomic flag with a zero-capacity channel
//! whose sender is dropped on cancellation, so `select!` loops blocked on
//! [`CancellationToken::observe`] wake the moment the scope fires.
//!
//! # Example
//!
//! ```
//! use conveyor_core::CancellationToken;
//!
//! let scope = CancellationToken::new();
//! let observer = scope.clone();
//!
//! scope.cancel_with("maintenance window opened");
//!
//! assert!(observer.is_cancelled());
//! assert_eq!(observer.cause().as_deref(), Some("maintenance window opened"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

/// A clonable token for cooperative cancellation.
///
/// All clones share one underlying state: cancelling any clone cancels them
/// all. Cancellation is one-way; a fired token never resets.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug)]
struct TokenState {
    cancelled: AtomicBool,
    cause: Mutex<Option<String>>,
    /// Dropped on cancellation, disconnecting `observer`.
    gate: Mutex<Option<Sender<()>>>,
    /// Never carries a message; wakes with a disconnect error on cancel.
    observer: Receiver<()>,
}

impl CancellationToken {
    /// Create a new, un-cancelled token.
    pub fn new() -> Self {
        let (gate, observer) = bounded(0);
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                cause: Mutex::new(None),
                gate: Mutex::new(Some(gate)),
                observer,
            }),
        }
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn cancel(&self) {
        self.fire(None);
    }

    /// Request cancellation, recording a human-readable cause.
    ///
    /// The cause is reported in the task error raised for any task skipped
    /// under this scope. A second cancellation never overwrites the first
    /// cause.
    pub fn cancel_with(&self, cause: impl Into<String>) {
        self.fire(Some(cause.into()));
    }

    /// The cause recorded at cancellation time, if any.
    pub fn cause(&self) -> Option<String> {
        self.inner.cause.lock().clone()
    }

    /// The channel endpoint that disconnects when the scope fires.
    ///
    /// Intended for `select!` arms: `recv` on this receiver blocks until
    /// cancellation, then returns a disconnect error.
    pub(crate) fn observe(&self) -> &Receiver<()> {
        &self.inner.observer
    }

    fn fire(&self, cause: Option<String>) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            if let Some(cause) = cause {
                *self.inner.cause.lock() = Some(cause);
            }
            // Drop the sender last so observers that wake see the cause.
            self.inner.gate.lock().take();
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
