//! Worker handles and the per-job lease handed to jobs.

use std::ops::Deref;
use std::sync::Arc;

use palettepool_core::WorkerId;
use serde::Serialize;

/// Lifecycle of a worker handle. There is no faulted state: a failing job
/// is a property of the job's result, never of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Busy,
}

/// The pool's reference to one computation unit.
///
/// Handles are created once with the pool and never cloned; ownership
/// moves between the idle pool and whichever task is running a job on it.
#[derive(Debug)]
pub struct WorkerHandle<U> {
    id: WorkerId,
    unit: Arc<U>,
    state: WorkerState,
}

impl<U> WorkerHandle<U> {
    pub fn new(id: WorkerId, unit: U) -> Self {
        Self {
            id,
            unit: Arc::new(unit),
            state: WorkerState::Idle,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub(crate) fn mark(&mut self, state: WorkerState) {
        self.state = state;
    }

    /// Lease the unit to a single job.
    pub(crate) fn lease(&self) -> WorkerLease<U> {
        WorkerLease {
            worker_id: self.id,
            unit: Arc::clone(&self.unit),
        }
    }
}

/// Access to a worker's unit for the duration of one job.
///
/// Dereferences to the unit. Jobs should not keep the lease past their
/// own completion; the worker is handed to the next job as soon as the
/// current one returns.
#[derive(Debug)]
pub struct WorkerLease<U> {
    worker_id: WorkerId,
    unit: Arc<U>,
}

impl<U> WorkerLease<U> {
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn unit(&self) -> &U {
        &self.unit
    }
}

impl<U> Deref for WorkerLease<U> {
    type Target = U;

    fn deref(&self) -> &U {
        &self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_is_idle() {
        let handle = WorkerHandle::new(WorkerId(0), "unit");
        assert_eq!(handle.state(), WorkerState::Idle);
        assert_eq!(handle.id(), WorkerId(0));
    }

    #[test]
    fn lease_derefs_to_the_unit() {
        let handle = WorkerHandle::new(WorkerId(4), String::from("gpu-less"));
        let lease = handle.lease();
        assert_eq!(lease.worker_id(), WorkerId(4));
        assert_eq!(lease.len(), 8);
        assert_eq!(lease.unit(), "gpu-less");
    }
}
