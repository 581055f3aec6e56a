//! Diagnostics emitted by the dispatcher.
//!
//! Every job transition is published on a [`tokio::sync::broadcast`]
//! channel. Call [`WorkerPool::subscribe`](crate::WorkerPool::subscribe)
//! to receive them. Slow subscribers lag; the dispatcher never waits.

use palettepool_core::{JobId, WorkerId};
use serde::Serialize;

/// A state change of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// No worker was idle; the job waits at `depth` (1 = next in line).
    Queued { job_id: JobId, depth: usize },

    /// The job was refused because the pending queue is full.
    Rejected { job_id: JobId, depth: usize },

    /// The job started on a worker after waiting `waited_ms`.
    Dispatched {
        job_id: JobId,
        worker_id: WorkerId,
        waited_ms: u64,
    },

    /// The job returned a value.
    Completed {
        job_id: JobId,
        worker_id: WorkerId,
        elapsed_ms: u64,
    },

    /// The job returned an error or panicked.
    Failed {
        job_id: JobId,
        worker_id: WorkerId,
        elapsed_ms: u64,
        error: String,
    },
}

impl DispatchEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Rejected { job_id, .. }
            | Self::Dispatched { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => *job_id,
        }
    }
}

/// Point-in-time view of a pool. `idle + busy == size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
    pub pending: usize,
    /// Jobs accepted (run or queued) since the pool was created.
    pub submitted: u64,
    pub completed: u64,
    /// Jobs that returned an error or panicked.
    pub failed: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DispatchEvent::Failed {
            job_id: JobId(7),
            worker_id: WorkerId(1),
            elapsed_ms: 12,
            error: "bad palette".to_string(),
        };
        let json = serde_json::to_value(&event).expect("event is serialisable");
        assert_eq!(json["type"], "failed");
        assert_eq!(json["job_id"], 7);
        assert_eq!(json["worker_id"], 1);
        assert_eq!(json["error"], "bad palette");
    }

    #[test]
    fn job_id_is_available_on_every_variant() {
        let events = [
            DispatchEvent::Queued {
                job_id: JobId(1),
                depth: 1,
            },
            DispatchEvent::Rejected {
                job_id: JobId(1),
                depth: 4,
            },
            DispatchEvent::Completed {
                job_id: JobId(1),
                worker_id: WorkerId(0),
                elapsed_ms: 0,
            },
        ];
        assert!(events.iter().all(|e| e.job_id() == JobId(1)));
    }
}
