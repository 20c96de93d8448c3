//! The bounded worker pool: lifecycle, admission, dispatch, termination.
//!
//! A fixed set of executor threads competes for tasks on a shared bounded
//! FIFO channel. Admission offers four backpressure policies (block, try,
//! deadline, scoped); termination converges all callers on a one-shot latch
//! and preserves in-flight work up to a deadline.
//!
//! # Example
//!
//! ```no_run
//! use conveyor_core::{PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::default().with_executors(4))?;
//!
//! pool.submit(|| {
//!     // Background work; report failure with `?` or an explicit Err.
//!     Ok(())
//! })?;
//!
//! // Block until every admitted task has finished dispatching.
//! pool.wait();
//!
//! // Graceful termination, bounded by the configured shutdown timeout.
//! pool.stop()?;
//! # Ok::<(), conveyor_core::PoolError>(())
//! ```

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use parking_lot::{Mutex, RwLock};

use crate::cancellation::CancellationToken;
use crate::config::{FailureCallback, PoolConfig};
use crate::error::{BoxError, PoolError, Result, TaskError};
use crate::stats::{PoolStats, StatsCollector};
use crate::task::{Task, TaskPriority};
use crate::waiter::WaitGroup;

/// State shared between the pool handle and its executor threads.
struct PoolShared {
    stats: StatsCollector,
    /// Tracks admitted tasks that have not finished dispatching. Raised
    /// before enqueue, lowered in the dispatch cleanup.
    inflight: WaitGroup,
    /// Tracks executor threads that have not exited.
    live_executors: WaitGroup,
    on_failure: Option<FailureCallback>,
}

/// How an admission behaves when the queue is full.
enum Admission {
    /// Block until space frees up or the pool closes.
    Block,
    /// Refuse immediately.
    Try,
    /// Block up to the deadline, then refuse.
    Deadline(Duration),
}

/// A bounded pool of executor threads consuming a FIFO task queue.
///
/// Tasks are fire-and-forget: submission reports only admission errors, and
/// execution failures reach the caller solely through the configured failure
/// callback. Admitted tasks are dispatched in FIFO order; the priority label
/// is carried but never used for reordering.
///
/// The pool is `Send + Sync`; share it behind an `Arc` to submit from many
/// threads.
pub struct WorkerPool {
    executors: usize,
    shutdown_timeout: Duration,
    /// Write side of the task channel. Submitters hold the read lock across
    /// an enqueue; termination takes the sender under the write lock, so any
    /// admission racing with shutdown lands in the channel strictly before
    /// the termination drain runs.
    tasks: RwLock<Option<Sender<Task>>>,
    /// Read side, retained for depth sampling and the termination drain.
    queue: Receiver<Task>,
    /// Pool-wide cancellation scope; fires exactly once, at termination.
    scope: CancellationToken,
    closed: AtomicBool,
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// One-shot termination latch. Holds the first termination's outcome;
    /// later callers return it unchanged.
    stop_result: Mutex<Option<Result<()>>>,
}

static_assertions::assert_impl_all!(WorkerPool: Send, Sync);

impl WorkerPool {
    /// Create a pool from the given configuration.
    ///
    /// Validates the configuration, allocates the bounded task channel, and
    /// spawns the executor threads. The pool is usable as soon as this
    /// returns.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let PoolConfig {
            executors,
            queue_capacity,
            shutdown_timeout,
            on_failure,
            metrics_enabled,
        } = config;

        let (sender, receiver) = bounded(queue_capacity);
        let scope = CancellationToken::new();
        let shared = Arc::new(PoolShared {
            stats: StatsCollector::new(metrics_enabled),
            inflight: WaitGroup::new(),
            live_executors: WaitGroup::new(),
            on_failure,
        });

        shared.live_executors.add(executors);
        let mut handles = Vec::with_capacity(executors);
        for index in 0..executors {
            shared.stats.executor_started();
            let queue = receiver.clone();
            let scope = scope.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("conveyor-executor-{index}"))
                .spawn(move || executor_loop(queue, scope, shared))
                .expect("failed to spawn executor thread");
            handles.push(handle);
        }

        tracing::debug!(
            target: "conveyor_core::pool",
            executors,
            queue_capacity,
            "worker pool started"
        );

        Ok(Self {
            executors,
            shutdown_timeout,
            tasks: RwLock::new(Some(sender)),
            queue: receiver,
            scope,
            closed: AtomicBool::new(false),
            shared,
            handles: Mutex::new(handles),
            stop_result: Mutex::new(None),
        })
    }

    /// Create a pool with default configuration: one executor per logical
    /// CPU, a queue capacity of 1024, and a 30 second shutdown timeout.
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default()).expect("default pool configuration is valid")
    }

    /// Submit a task, blocking while the queue is full.
    ///
    /// Returns [`PoolError::Closed`] if the pool has begun termination,
    /// including while this call is blocked on a full queue.
    pub fn submit<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.enqueue(
            Task::new(Box::new(work), TaskPriority::default(), None),
            Admission::Block,
        )
    }

    /// Submit a task carrying an explicit priority label.
    ///
    /// Behaves exactly as [`WorkerPool::submit`]; the label travels on the
    /// task record for observability and higher layers, but dispatch order
    /// remains FIFO. True priority scheduling would require a priority
    /// queue, which this design does not include.
    pub fn submit_with_priority<F>(&self, priority: TaskPriority, work: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.enqueue(Task::new(Box::new(work), priority, None), Admission::Block)
    }

    /// Submit a task without blocking.
    ///
    /// Returns [`PoolError::QueueFull`] (and records a rejection) when no
    /// queue space is available right now.
    pub fn try_submit<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.enqueue(
            Task::new(Box::new(work), TaskPriority::default(), None),
            Admission::Try,
        )
    }

    /// Submit a task, blocking up to `timeout` for queue space.
    ///
    /// Returns [`PoolError::Timeout`] (and records a rejection) when the
    /// deadline expires first. The deadline bounds admission only, never
    /// execution.
    pub fn submit_timeout<F>(&self, timeout: Duration, work: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.enqueue(
            Task::new(Box::new(work), TaskPriority::default(), None),
            Admission::Deadline(timeout),
        )
    }

    /// Submit a task bound to a cancellation scope.
    ///
    /// Admission blocks like [`WorkerPool::submit`] and does not consult the
    /// scope; the scope is checked once more immediately before the task
    /// body runs, and a task whose scope has fired by then is skipped with a
    /// task error reported to the failure callback.
    pub fn submit_scoped<F>(&self, scope: CancellationToken, work: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.enqueue(
            Task::new(Box::new(work), TaskPriority::default(), Some(scope)),
            Admission::Block,
        )
    }

    /// Whether termination has begun.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The configured executor thread count.
    pub fn executor_count(&self) -> usize {
        self.executors
    }

    /// Block until every admitted task has finished dispatching.
    ///
    /// Distinct from termination: the pool stays open, and admissions after
    /// the barrier drains will raise it again.
    pub fn wait(&self) {
        self.shared.inflight.wait();
    }

    /// A point-in-time copy of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot(self.queue.len())
    }

    /// Terminate the pool, bounded by the configured shutdown timeout.
    ///
    /// Stops admissions, signals the executors, and waits up to the timeout
    /// for them to exit. Returns [`PoolError::ForcedShutdown`] if executors
    /// are still running when the deadline fires; those threads keep running
    /// until their current task returns and are acknowledged leaks.
    ///
    /// Idempotent: concurrent and repeated calls converge on one shutdown
    /// sequence and return the first call's outcome.
    pub fn stop(&self) -> Result<()> {
        let timeout = self.shutdown_timeout;
        self.terminate(move |live_executors| live_executors.wait_timeout(timeout))
    }

    /// Terminate the pool, bounded by an externally supplied scope.
    ///
    /// As [`WorkerPool::stop`], but the executor wait is cut off when
    /// `deadline` fires instead of after a fixed timeout.
    pub fn stop_with_scope(&self, deadline: &CancellationToken) -> Result<()> {
        self.terminate(move |live_executors| live_executors.wait_cancelled(deadline))
    }

    /// Admission path shared by every submission variant.
    fn enqueue(&self, task: Task, admission: Admission) -> Result<()> {
        let guard = self.tasks.read();
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::Closed);
        };

        // Raise the in-flight barrier before the task can be observed by an
        // executor; every refusal below compensates.
        self.shared.inflight.add(1);

        let result = match admission {
            Admission::Block => select! {
                send(sender, task) -> sent => sent.map_err(|_| PoolError::Closed),
                recv(self.scope.observe()) -> _ => Err(PoolError::Closed),
            },
            Admission::Try => match sender.try_send(task) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(PoolError::QueueFull),
                Err(TrySendError::Disconnected(_)) => Err(PoolError::Closed),
            },
            Admission::Deadline(timeout) => select! {
                send(sender, task) -> sent => sent.map_err(|_| PoolError::Closed),
                recv(self.scope.observe()) -> _ => Err(PoolError::Closed),
                default(timeout) => Err(PoolError::Timeout),
            },
        };

        if let Err(error) = &result {
            self.shared.inflight.done();
            if matches!(error, PoolError::QueueFull | PoolError::Timeout) {
                self.shared.stats.record_rejection();
            }
            tracing::trace!(target: "conveyor_core::pool", %error, "admission refused");
        }
        result
    }

    /// One-shot termination sequence.
    fn terminate(&self, wait: impl FnOnce(&WaitGroup) -> bool) -> Result<()> {
        let mut outcome = self.stop_result.lock();
        if let Some(result) = outcome.as_ref() {
            return result.clone();
        }

        tracing::debug!(target: "conveyor_core::pool", "shutting down worker pool");
        self.closed.store(true, Ordering::Release);
        self.scope.cancel();
        // Blocked admissions have observed the cancellation by the time the
        // write lock is granted, so no task enters the channel after this.
        drop(self.tasks.write().take());

        let drained = wait(&self.shared.live_executors);
        if drained {
            for handle in self.handles.lock().drain(..) {
                let _ = handle.join();
            }
        }

        let abandoned = self.reject_undispatched();
        if abandoned > 0 {
            tracing::debug!(
                target: "conveyor_core::pool",
                abandoned,
                "tasks still queued at shutdown were rejected"
            );
        }

        let result = if drained {
            Ok(())
        } else {
            tracing::warn!(
                target: "conveyor_core::pool",
                "executors still running at shutdown deadline"
            );
            Err(PoolError::ForcedShutdown)
        };
        *outcome = Some(result.clone());
        result
    }

    /// Drain tasks the executors abandoned at shutdown, accounting each as
    /// rejected so the admission ledger balances.
    fn reject_undispatched(&self) -> usize {
        let mut abandoned = 0;
        while let Ok(task) = self.queue.try_recv() {
            let error = TaskError::cancelled(
                task.id,
                Some("pool shut down before the task was dispatched".to_string()),
            );
            self.shared.stats.record_rejection();
            self.shared.stats.record_error(&error);
            if let Some(hook) = &self.shared.on_failure {
                hook(error);
            }
            self.shared.inflight.done();
            abandoned += 1;
        }
        abandoned
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("executors", &self.executors)
            .field("queue_depth", &self.queue.len())
            .field("in_flight", &self.shared.inflight.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Request shutdown so executor threads exit on their own; don't
        // block in drop.
        self.closed.store(true, Ordering::Release);
        self.scope.cancel();
        drop(self.tasks.write().take());
    }
}

/// The loop each executor thread runs until termination.
fn executor_loop(queue: Receiver<Task>, scope: CancellationToken, shared: Arc<PoolShared>) {
    loop {
        // Checked first so the shutdown branch wins over a ready dequeue on
        // the first iteration after termination begins.
        if scope.is_cancelled() {
            break;
        }
        select! {
            recv(scope.observe()) -> _ => break,
            recv(queue) -> message => match message {
                Ok(task) => dispatch(task, &shared),
                Err(_) => break,
            },
        }
    }
    shared.stats.executor_stopped();
    shared.live_executors.done();
    tracing::trace!(
        target: "conveyor_core::executor",
        thread = thread::current().name(),
        "executor stopped"
    );
}

/// Run one task inside its cleanup envelope.
///
/// The completion record and the in-flight decrement run regardless of the
/// task's outcome, so a panicking task can neither kill its executor nor
/// skew the accounting. Skipped and panicking tasks both count as completed.
fn dispatch(task: Task, shared: &PoolShared) {
    let Task {
        id,
        work,
        priority,
        scope,
        created_at,
    } = task;

    tracing::trace!(
        target: "conveyor_core::executor",
        %id,
        ?priority,
        queued_for = ?created_at.elapsed(),
        "dispatching task"
    );

    let started = Instant::now();
    let failure = if scope.is_cancelled() {
        Some(TaskError::cancelled(id, scope.cause()))
    } else {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(())) => None,
            Ok(Err(source)) => Some(TaskError::failed(id, source)),
            Err(payload) => Some(TaskError::panicked(id, payload, Backtrace::force_capture())),
        }
    };

    if let Some(error) = failure {
        tracing::debug!(target: "conveyor_core::executor", %error, "task failed");
        shared.stats.record_error(&error);
        if let Some(hook) = &shared.on_failure {
            hook(error);
        }
    }

    shared.stats.record_completion(started.elapsed());
    shared.inflight.done();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;

    use super::*;

    /// A config sized for tests: small, fast shutdown.
    fn test_config(executors: usize, capacity: usize) -> PoolConfig {
        PoolConfig::default()
            .with_executors(executors)
            .with_queue_capacity(capacity)
            .with_shutdown_timeout(Duration::from_secs(5))
    }

    /// Collects failure callback deliveries for assertions.
    fn collecting_callback() -> (Arc<Mutex<Vec<TaskError>>>, PoolConfig) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let config = PoolConfig::default()
            .with_failure_callback(move |error| sink.lock().push(error));
        (errors, config)
    }

    #[test]
    fn test_invalid_config_rejects_construction() {
        let result = WorkerPool::new(test_config(0, 4));
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_happy_path() {
        let pool = WorkerPool::new(test_config(2, 10)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let ran = ran.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        pool.wait();
        assert_eq!(ran.load(Ordering::SeqCst), 100);

        let stats = pool.stats();
        assert_eq!(stats.completed, 100);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.active_executors, 2);
        assert_eq!(stats.queue_depth, 0);

        pool.stop().unwrap();
        assert_eq!(pool.stats().active_executors, 0);
    }

    #[test]
    fn test_try_submit_reports_queue_full() {
        let pool = WorkerPool::new(test_config(1, 2)).unwrap();
        let (started_tx, started_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded::<()>();

        // Occupy the single executor until the gate opens.
        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Fill both queue slots.
        pool.try_submit(|| Ok(())).unwrap();
        pool.try_submit(|| Ok(())).unwrap();

        // No space left.
        assert_eq!(pool.try_submit(|| Ok(())), Err(PoolError::QueueFull));
        assert_eq!(pool.stats().rejected, 1);

        gate_tx.send(()).unwrap();
        pool.wait();
        pool.stop().unwrap();
    }

    #[test]
    fn test_submit_timeout_expires() {
        let pool = WorkerPool::new(test_config(1, 1)).unwrap();
        let (started_tx, started_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded::<()>();

        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Fill the single queue slot.
        pool.submit(|| Ok(())).unwrap();

        let before = Instant::now();
        let result = pool.submit_timeout(Duration::from_millis(50), || Ok(()));
        let elapsed = before.elapsed();

        assert_eq!(result, Err(PoolError::Timeout));
        assert!(elapsed >= Duration::from_millis(40), "returned too early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(250), "returned too late: {elapsed:?}");
        assert_eq!(pool.stats().rejected, 1);

        gate_tx.send(()).unwrap();
        pool.wait();
        pool.stop().unwrap();
    }

    #[test]
    fn test_panic_isolation() {
        let (errors, config) = collecting_callback();
        let pool = WorkerPool::new(
            config
                .with_executors(2)
                .with_queue_capacity(10)
                .with_shutdown_timeout(Duration::from_secs(5)),
        )
        .unwrap();

        pool.submit(|| panic!("boom")).unwrap();
        pool.wait();

        {
            let errors = errors.lock();
            assert_eq!(errors.len(), 1);
            let source = errors[0].to_string();
            assert!(source.contains("panic: boom"), "unexpected error: {source}");
            assert!(!errors[0].trace().unwrap().is_empty());
        }

        // The executor that recovered the panic keeps dispatching.
        pool.submit(|| Ok(())).unwrap();
        pool.wait();

        let stats = pool.stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.active_executors, 2);
        assert!(stats.last_error.unwrap().contains("panic: boom"));

        pool.stop().unwrap();
    }

    #[test]
    fn test_task_returned_error_reaches_callback() {
        let (errors, config) = collecting_callback();
        let pool = WorkerPool::new(config.with_executors(1)).unwrap();

        pool.submit(|| Err("upstream unavailable".into())).unwrap();
        pool.wait();

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("upstream unavailable"));
        // Returned errors carry no panic trace.
        assert!(errors[0].trace().is_none());

        drop(errors);
        pool.stop().unwrap();
    }

    #[test]
    fn test_forced_shutdown() {
        let pool = WorkerPool::new(
            test_config(2, 10).with_shutdown_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let (gate_tx, gate_rx) = unbounded::<()>();

        for _ in 0..4 {
            let gate_rx = gate_rx.clone();
            pool.submit(move || {
                let _ = gate_rx.recv();
                Ok(())
            })
            .unwrap();
        }
        thread::sleep(Duration::from_millis(10));

        assert_eq!(pool.stop(), Err(PoolError::ForcedShutdown));

        // Release the stragglers so the test process does not hold threads.
        drop(gate_tx);
    }

    #[test]
    fn test_pre_execution_cancellation() {
        let (errors, config) = collecting_callback();
        let pool = WorkerPool::new(
            config
                .with_executors(2)
                .with_queue_capacity(10)
                .with_shutdown_timeout(Duration::from_secs(5)),
        )
        .unwrap();

        let scope = CancellationToken::new();
        scope.cancel_with("request superseded");

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        pool.submit_scoped(scope, move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        pool.wait();

        assert!(!ran.load(Ordering::SeqCst));
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("request superseded"));
        assert!(errors[0].trace().is_none());

        drop(errors);
        pool.stop().unwrap();
    }

    #[test]
    fn test_submissions_after_stop_are_refused() {
        let pool = WorkerPool::new(test_config(1, 4)).unwrap();
        pool.stop().unwrap();

        assert!(pool.is_closed());
        assert_eq!(pool.submit(|| Ok(())), Err(PoolError::Closed));
        assert_eq!(pool.try_submit(|| Ok(())), Err(PoolError::Closed));
        assert_eq!(
            pool.submit_timeout(Duration::from_millis(10), || Ok(())),
            Err(PoolError::Closed)
        );
        assert_eq!(
            pool.submit_scoped(CancellationToken::new(), || Ok(())),
            Err(PoolError::Closed)
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let pool = WorkerPool::new(test_config(2, 4)).unwrap();
        assert_eq!(pool.stop(), Ok(()));
        assert_eq!(pool.stop(), Ok(()));
        // A scope-bounded call after the latch fired returns the same
        // outcome without rerunning the shutdown sequence.
        assert_eq!(pool.stop_with_scope(&CancellationToken::new()), Ok(()));
    }

    #[test]
    fn test_stop_with_scope_deadline() {
        let pool = WorkerPool::new(test_config(1, 4)).unwrap();
        let (gate_tx, gate_rx) = unbounded::<()>();

        pool.submit(move || {
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        thread::sleep(Duration::from_millis(10));

        let deadline = CancellationToken::new();
        deadline.cancel();
        assert_eq!(pool.stop_with_scope(&deadline), Err(PoolError::ForcedShutdown));

        drop(gate_tx);
    }

    #[test]
    fn test_fifo_order_with_single_executor() {
        let pool = WorkerPool::new(test_config(1, 100)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for index in 0..50 {
            let order = order.clone();
            pool.submit(move || {
                order.lock().push(index);
                Ok(())
            })
            .unwrap();
        }

        pool.wait();
        assert_eq!(*order.lock(), (0..50).collect::<Vec<_>>());
        pool.stop().unwrap();
    }

    #[test]
    fn test_rendezvous_queue() {
        let pool = WorkerPool::new(test_config(1, 0)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        // Every admission is a direct handoff to the executor.
        for _ in 0..5 {
            let ran = ran.clone();
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
        pool.wait();
        assert_eq!(ran.load(Ordering::SeqCst), 5);

        // With the executor busy there is no receiver waiting, so a
        // non-blocking handoff has nowhere to go.
        let (started_tx, started_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded::<()>();
        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.try_submit(|| Ok(())), Err(PoolError::QueueFull));

        gate_tx.send(()).unwrap();
        pool.wait();
        pool.stop().unwrap();
    }

    #[test]
    fn test_blocking_submit_wakes_on_stop() {
        let pool = Arc::new(WorkerPool::new(test_config(1, 0)).unwrap());
        let (started_tx, started_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded::<()>();

        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // This submitter blocks: the executor is busy and the queue has no
        // buffer. Stopping the pool must wake it with `Closed`.
        let blocked = {
            let pool = pool.clone();
            thread::spawn(move || pool.submit(|| Ok(())))
        };
        thread::sleep(Duration::from_millis(20));

        let stopper = {
            let pool = pool.clone();
            thread::spawn(move || pool.stop())
        };
        assert_eq!(
            blocked.join().unwrap(),
            Err(PoolError::Closed),
            "blocked submitter should observe shutdown"
        );

        gate_tx.send(()).unwrap();
        stopper.join().unwrap().unwrap();
    }

    #[test]
    fn test_tasks_abandoned_at_shutdown_are_rejected() {
        let (errors, config) = collecting_callback();
        let pool = WorkerPool::new(
            config
                .with_executors(1)
                .with_queue_capacity(8)
                .with_shutdown_timeout(Duration::from_secs(5)),
        )
        .unwrap();
        let (started_tx, started_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded::<()>();

        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Queue three tasks behind the gated one.
        for _ in 0..3 {
            pool.submit(|| Ok(())).unwrap();
        }

        assert_eq!(pool.stats().rejected, 0);
        let release = {
            let gate_tx = gate_tx.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                gate_tx.send(()).unwrap();
            })
        };

        // The executor exits on cancellation without draining the queue;
        // stop itself accounts the abandoned tasks as rejected.
        pool.stop().unwrap();
        release.join().unwrap();

        let stats = pool.stats();
        assert_eq!(
            stats.completed + stats.rejected,
            4,
            "every admitted task is counted exactly once"
        );
        assert_eq!(
            errors.lock().len() as u64,
            stats.rejected,
            "each abandoned task reaches the failure callback"
        );

        // The in-flight barrier drained despite the abandoned tasks.
        pool.wait();
    }

    #[test]
    fn test_concurrent_submitters() {
        let pool = Arc::new(WorkerPool::new(test_config(4, 64)).unwrap());
        let ran = Arc::new(AtomicUsize::new(0));

        let submitters: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let ran = ran.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let ran = ran.clone();
                        pool.submit(move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for submitter in submitters {
            submitter.join().unwrap();
        }
        pool.wait();

        assert_eq!(ran.load(Ordering::SeqCst), 200);
        assert_eq!(pool.stats().completed, 200);
        pool.stop().unwrap();
    }

    #[test]
    fn test_mean_latency_tracks_execution_time() {
        let pool = WorkerPool::new(test_config(1, 8)).unwrap();

        for _ in 0..3 {
            pool.submit(|| {
                thread::sleep(Duration::from_millis(10));
                Ok(())
            })
            .unwrap();
        }
        pool.wait();

        let stats = pool.stats();
        assert!(
            stats.mean_exec_time >= Duration::from_millis(8),
            "mean latency too small: {:?}",
            stats.mean_exec_time
        );
        pool.stop().unwrap();
    }

    #[test]
    fn test_zero_shutdown_timeout_forces_shutdown() {
        let pool = WorkerPool::new(
            test_config(1, 4).with_shutdown_timeout(Duration::ZERO),
        )
        .unwrap();
        let (gate_tx, gate_rx) = unbounded::<()>();

        pool.submit(move || {
            let _ = gate_rx.recv();
            Ok(())
        })
        .unwrap();
        thread::sleep(Duration::from_millis(10));

        assert_eq!(pool.stop(), Err(PoolError::ForcedShutdown));
        drop(gate_tx);
    }

    #[test]
    fn test_debug_output() {
        let pool = WorkerPool::new(test_config(2, 4)).unwrap();
        let printed = format!("{pool:?}");
        assert!(printed.contains("executors: 2"));
        assert!(printed.contains("closed: false"));
        pool.stop().unwrap();
    }

    #[test]
    fn test_executor_threads_are_named() {
        let pool = WorkerPool::new(test_config(1, 4)).unwrap();
        let (name_tx, name_rx) = unbounded();

        pool.submit(move || {
            name_tx
                .send(thread::current().name().map(str::to_string))
                .unwrap();
            Ok(())
        })
        .unwrap();

        let name = name_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("conveyor-executor-0"));
        pool.stop().unwrap();
    }
}
