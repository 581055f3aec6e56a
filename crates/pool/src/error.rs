use std::time::Duration;

use palettepool_core::WorkerId;

/// Why a submitted job did not produce a value.
///
/// [`JobError::Failed`] carries the job's own error exactly as the job
/// returned it. The other variants are produced by the pool itself.
#[derive(Debug, thiserror::Error)]
pub enum JobError<E> {
    /// The job ran and returned an error.
    #[error("{0}")]
    Failed(E),

    /// The job panicked while running.
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The pending queue was at its configured bound.
    #[error("Pending queue is full ({depth} jobs waiting)")]
    QueueFull { depth: usize },

    /// The caller stopped waiting. The job itself keeps running.
    #[error("Job did not finish within {0:?}")]
    TimedOut(Duration),

    /// The pool was torn down before the job reported a result.
    #[error("Job was dropped before it completed")]
    Abandoned,
}

impl<E> JobError<E> {
    /// The job's own error, if that is what this is.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// `true` when the job ran and returned an error.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Errors raised while building a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A pool needs at least one worker.
    #[error("Worker pool must contain at least one unit")]
    NoWorkers,

    /// The spawner failed to create a computation unit.
    #[error("Failed to spawn unit for worker {worker_id}: {reason}")]
    UnitSpawn { worker_id: WorkerId, reason: String },

    /// The blocking initialization task did not finish.
    #[error("Pool initialization failed: {0}")]
    Init(String),
}
