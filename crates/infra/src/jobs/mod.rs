//! Job retry engine.
//!
//! ## Components
//!
//! - `JobQueue`: the shared, lock-guarded set of pending jobs
//! - `SineBackoff`: attempt-indexed retry delay
//! - `RetryExecutor`: drives one job until it is written
//! - `Dispatcher`: spawns an executor for every job that reaches the queue
//! - `persistence`: saves the queue on shutdown and restores it on start
//!
//! Data flows one way: `JobQueue::add` announces the job to the dispatcher,
//! the dispatcher spawns an executor, and the executor calls
//! `JobQueue::remove` once the write succeeds.

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod persistence;
pub mod queue;
pub mod types;

pub use backoff::SineBackoff;
pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherMonitor, DispatcherStats};
pub use error::{AttemptError, PersistenceError};
pub use executor::RetryExecutor;
pub use persistence::{
    InMemorySnapshotStore, JsonFileStore, RestoreFailure, SnapshotStore, persist_snapshot,
    restore_into, spawn_periodic_snapshots,
};
pub use queue::{Arrivals, EntryId, JobQueue, QueuedJob};
pub use types::{
    AttemptOutcome, AttemptTracking, ExecutorOutcome, ExecutorState, RetryLimit, RetryPolicy,
};
