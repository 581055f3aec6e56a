//! The set of workers available for assignment.
//!
//! Backed by a stack: the most recently released worker is reused first.
//! Workers are interchangeable, so no fairness among them is attempted;
//! fairness is only promised to queued jobs.

use crate::handle::{WorkerHandle, WorkerState};

#[derive(Debug)]
pub struct IdlePool<U> {
    stack: Vec<WorkerHandle<U>>,
}

impl<U> IdlePool<U> {
    /// Build an idle pool from freshly created handles.
    ///
    /// Handles are stacked in reverse so the lowest worker id is acquired
    /// first on a fresh pool.
    pub fn new(mut handles: Vec<WorkerHandle<U>>) -> Self {
        handles.reverse();
        for handle in &mut handles {
            handle.mark(WorkerState::Idle);
        }
        Self { stack: handles }
    }

    /// Take a worker, marking it busy.
    pub fn acquire(&mut self) -> Option<WorkerHandle<U>> {
        let mut handle = self.stack.pop()?;
        handle.mark(WorkerState::Busy);
        Some(handle)
    }

    /// Return a worker, marking it idle.
    pub fn release(&mut self, mut handle: WorkerHandle<U>) {
        handle.mark(WorkerState::Idle);
        self.stack.push(handle);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
