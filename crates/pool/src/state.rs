//! The dispatcher's state machine.
//!
//! Every transition happens inside one call on [`DispatchState`], which
//! the pool only ever touches under its mutex. That makes "check for an
//! idle worker, then claim it" and "release a worker, then hand it to the
//! queue head" single atomic steps.

use crate::handle::WorkerHandle;
use crate::idle::IdlePool;
use crate::queue::PendingQueue;

/// What `admit` decided for a newly submitted job.
#[derive(Debug)]
pub(crate) enum Admission<U, J> {
    /// A worker was idle; run the job on it now.
    Run(WorkerHandle<U>, J),
    /// Every worker is busy; the job waits at this depth.
    Queued { depth: usize },
    /// The queue is at its bound; the job is handed back.
    Rejected { job: J, depth: usize },
}

#[derive(Debug)]
pub(crate) struct DispatchState<U, J> {
    idle: IdlePool<U>,
    pending: PendingQueue<J>,
    busy: usize,
    size: usize,
}

impl<U, J> DispatchState<U, J> {
    pub fn new(handles: Vec<WorkerHandle<U>>, max_pending: Option<usize>) -> Self {
        let size = handles.len();
        Self {
            idle: IdlePool::new(handles),
            pending: PendingQueue::new(max_pending),
            busy: 0,
            size,
        }
    }

    /// Claim an idle worker for `job`, or queue it.
    pub fn admit(&mut self, job: J) -> Admission<U, J> {
        let admission = match self.idle.acquire() {
            Some(handle) => {
                self.busy += 1;
                Admission::Run(handle, job)
            }
            None => match self.pending.push(job) {
                Ok(depth) => Admission::Queued { depth },
                Err(job) => Admission::Rejected {
                    job,
                    depth: self.pending.len(),
                },
            },
        };
        self.check_invariants();
        admission
    }

    /// Release a worker whose job just ended.
    ///
    /// If jobs are waiting, the worker goes straight to the oldest one and
    /// both are returned for dispatch; the worker stays busy. Otherwise it
    /// returns to the idle pool.
    pub fn release_and_drain(&mut self, handle: WorkerHandle<U>) -> Option<(WorkerHandle<U>, J)> {
        let next = match self.pending.pop() {
            Some(job) => Some((handle, job)),
            None => {
                self.busy -= 1;
                self.idle.release(handle);
                None
            }
        };
        self.check_invariants();
        next
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn busy(&self) -> usize {
        self.busy
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn check_invariants(&self) {
        debug_assert_eq!(self.idle.len() + self.busy, self.size);
        debug_assert!(self.pending.is_empty() || self.idle.is_empty());
    }
}
