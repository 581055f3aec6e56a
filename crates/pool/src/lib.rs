//! Worker pool dispatcher.
//!
//! Turns a fixed set of single-job-at-a-time computation units into a
//! job submission API that any number of tasks can call concurrently.
//!
//! - [`WorkerPool`] -- the pool and its dispatcher: `submit`, `stats`,
//!   `subscribe`.
//! - [`PoolFactory`] -- one-shot, idempotent pool construction.
//! - [`JobHandle`] -- the caller's side of a submitted job.
//! - [`DispatchEvent`] -- broadcast diagnostics for every job transition.
//!
//! Jobs that find an idle worker start immediately; the rest wait in a
//! FIFO queue and are handed the next worker that frees up. A worker is
//! always released when its job ends, whether the job succeeded, failed,
//! or panicked.

pub mod error;
pub mod events;
pub mod factory;
pub mod handle;
pub mod idle;
pub mod job;
pub mod pool;
pub mod queue;
mod state;

pub use error::{JobError, PoolError};
pub use events::{DispatchEvent, PoolStats};
pub use factory::PoolFactory;
pub use handle::{WorkerHandle, WorkerLease, WorkerState};
pub use job::JobHandle;
pub use pool::WorkerPool;
