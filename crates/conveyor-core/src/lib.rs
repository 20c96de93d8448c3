//! Core execution engine for Conveyor.

#![warn(missing_docs)]
//!
//! This crate provides the foundational components of the Conveyor task
//! engine:
//!
//! - **Worker Pool**: A fixed set of executor threads consuming a bounded
//!   FIFO task queue
//! - **Admission Control**: Blocking, non-blocking, deadline-bounded, and
//!   scope-carrying submission with backpressure
//! - **Panic Isolation**: A recovering dispatch envelope so one faulty task
//!   cannot poison its executor
//! - **Lifecycle**: Graceful termination with in-flight preservation and a
//!   one-shot shutdown latch
//! - **Statistics**: Lock-free counters with value snapshots for
//!   observability
//!
//! # Worker Pool Example
//!
//! ```no_run
//! use conveyor_core::{PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::default().with_executors(4))?;
//!
//! for batch in 0..16 {
//!     pool.submit(move || {
//!         // Expensive background work; failures travel through the
//!         // configured failure callback, not the submitter.
//!         process_batch(batch)?;
//!         Ok(())
//!     })?;
//! }
//!
//! // Block until every admitted task has finished dispatching.
//! pool.wait();
//! pool.stop()?;
//! # fn process_batch(_batch: i32) -> Result<(), conveyor_core::BoxError> { Ok(()) }
//! # Ok::<(), conveyor_core::PoolError>(())
//! ```
//!
//! # Backpressure Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use conveyor_core::{PoolConfig, PoolError, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::default().with_queue_capacity(8))?;
//!
//! if let Err(PoolError::QueueFull) = pool.try_submit(|| Ok(())) {
//!     // Shed load, or retry with a bounded wait instead.
//!     pool.submit_timeout(Duration::from_millis(50), || Ok(()))?;
//! }
//! # Ok::<(), conveyor_core::PoolError>(())
//! ```
//!
//! # Observing Failures
//!
//! ```no_run
//! use conveyor_core::{PoolConfig, WorkerPool};
//!
//! let config = PoolConfig::default().with_failure_callback(|error| {
//!     eprintln!("task failed: {error}");
//! });
//! let pool = WorkerPool::new(config)?;
//! # Ok::<(), conveyor_core::PoolError>(())
//! ```

pub mod cancellation;
mod config;
mod error;
pub mod pool;
mod stats;
mod task;
mod waiter;

pub use cancellation::CancellationToken;
pub use config::{FailureCallback, PoolConfig};
pub use error::{BoxError, PoolError, Result, TaskError};
pub use pool::WorkerPool;
pub use stats::PoolStats;
pub use task::{TaskId, TaskPriority};
