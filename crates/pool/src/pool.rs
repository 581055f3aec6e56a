//! The worker pool and its dispatcher.
//!
//! [`WorkerPool::submit`] decides synchronously, under a short-lived lock,
//! whether a job runs now or waits. Running jobs execute on Tokio tasks;
//! when one ends, its worker is released and, in the same locked step,
//! handed to the oldest waiting job. The task that owned the worker then
//! runs that job too, so draining the queue is a loop rather than a chain
//! of nested submissions.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use palettepool_core::{JobId, PoolConfig, WorkerId};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

use crate::error::{JobError, PoolError};
use crate::events::{DispatchEvent, PoolStats};
use crate::handle::{WorkerHandle, WorkerLease};
use crate::job::{JobHandle, JobOutcome, PendingJob};
use crate::state::{Admission, DispatchState};

/// A fixed-size pool of computation units plus the dispatcher that feeds
/// them.
///
/// Cheap to clone; all clones share the same workers and queue.
pub struct WorkerPool<U> {
    shared: Arc<Shared<U>>,
}

impl<U> Clone for WorkerPool<U> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<U: Send + Sync + 'static> std::fmt::Debug for WorkerPool<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .finish()
    }
}

struct Shared<U> {
    state: Mutex<DispatchState<U, PendingJob<U>>>,
    events: broadcast::Sender<DispatchEvent>,
    next_job_id: AtomicU64,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl<U: Send + Sync + 'static> WorkerPool<U> {
    /// Build a pool around already-created units. Worker ids follow the
    /// order of `units`.
    ///
    /// Queue bound and event capacity come from `config`; the pool size is
    /// simply `units.len()`.
    pub fn with_units(units: Vec<U>, config: &PoolConfig) -> Result<Self, PoolError> {
        if units.is_empty() {
            return Err(PoolError::NoWorkers);
        }

        let handles: Vec<_> = units
            .into_iter()
            .enumerate()
            .map(|(i, unit)| WorkerHandle::new(WorkerId(i), unit))
            .collect();
        let size = handles.len();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        tracing::info!(
            size,
            max_pending = ?config.max_pending,
            "Worker pool created",
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DispatchState::new(handles, config.max_pending)),
                events,
                next_job_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        })
    }

    /// Submit a job.
    ///
    /// If a worker is idle the job starts right away; otherwise it waits
    /// in FIFO order for the next worker to free up. The returned handle
    /// resolves to the job's value, or to [`JobError::Failed`] carrying the
    /// job's own error untouched.
    ///
    /// Must be called from within a Tokio runtime. Called outside one, it
    /// panics the way `tokio::spawn` does, but the worker it claimed is
    /// returned to the pool first.
    pub fn submit<F, Fut, T, E>(&self, job: F) -> JobHandle<T, E>
    where
        F: FnOnce(WorkerLease<U>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let job_id = JobId(self.shared.next_job_id.fetch_add(1, Ordering::Relaxed));
        let (pending, handle) = PendingJob::new(job_id, job);

        let admission = self.shared.lock().admit(pending);

        match admission {
            Admission::Run(worker, pending) => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                let checkout = Checkout::new(Arc::clone(&self.shared), worker);
                tokio::spawn(Shared::drive(checkout, pending));
                handle
            }
            Admission::Queued { depth } => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(job_id = %job_id, depth, "All workers busy, job queued");
                self.shared.emit(DispatchEvent::Queued { job_id, depth });
                handle
            }
            Admission::Rejected { job, depth } => {
                drop(job);
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job_id = %job_id, depth, "Pending queue full, job rejected");
                self.shared.emit(DispatchEvent::Rejected { job_id, depth });
                JobHandle::ready(job_id, Err(JobError::QueueFull { depth }))
            }
        }
    }

    /// Number of workers. Fixed for the life of the pool.
    pub fn size(&self) -> usize {
        self.shared.lock().size()
    }

    /// Snapshot of worker and queue occupancy plus lifetime counters.
    pub fn stats(&self) -> PoolStats {
        let (size, idle, busy, pending) = {
            let state = self.shared.lock();
            (state.size(), state.idle(), state.busy(), state.pending())
        };
        let counters = &self.shared.counters;
        PoolStats {
            size,
            idle,
            busy,
            pending,
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Subscribe to dispatch events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.shared.events.subscribe()
    }
}

impl<U> Shared<U> {
    fn lock(&self) -> MutexGuard<'_, DispatchState<U, PendingJob<U>>> {
        // Transitions never panic halfway, so a poisoned state is still whole.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DispatchEvent) {
        // Zero subscribers is fine.
        let _ = self.events.send(event);
    }

    fn record(&self, job_id: JobId, worker_id: WorkerId, elapsed: Duration, outcome: &JobOutcome) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            JobOutcome::Succeeded => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(job_id = %job_id, worker_id = %worker_id, elapsed_ms, "Job completed");
                self.emit(DispatchEvent::Completed {
                    job_id,
                    worker_id,
                    elapsed_ms,
                });
            }
            JobOutcome::Failed(error) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    job_id = %job_id,
                    worker_id = %worker_id,
                    elapsed_ms,
                    error = %error,
                    "Job failed",
                );
                self.emit(DispatchEvent::Failed {
                    job_id,
                    worker_id,
                    elapsed_ms,
                    error: error.clone(),
                });
            }
            JobOutcome::Panicked(message) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    job_id = %job_id,
                    worker_id = %worker_id,
                    elapsed_ms,
                    panic = %message,
                    "Job panicked",
                );
                self.emit(DispatchEvent::Failed {
                    job_id,
                    worker_id,
                    elapsed_ms,
                    error: format!("panicked: {message}"),
                });
            }
        }
    }
}

impl<U: Send + Sync + 'static> Shared<U> {
    /// Run `job` on the checked-out worker, then keep running whatever the
    /// queue hands back until the worker goes idle.
    ///
    /// The checkout is created before the task is spawned, so dropping this
    /// future at any point, even before its first poll, still returns the
    /// worker.
    async fn drive(mut checkout: Checkout<U>, job: PendingJob<U>) {
        let shared = Arc::clone(&checkout.shared);
        let mut job = job;

        loop {
            let Some((worker_id, lease)) = checkout.lease() else {
                return;
            };
            let job_id = job.id;
            let waited_ms = job.submitted_at.elapsed().as_millis() as u64;

            tracing::debug!(job_id = %job_id, worker_id = %worker_id, waited_ms, "Job dispatched");
            shared.emit(DispatchEvent::Dispatched {
                job_id,
                worker_id,
                waited_ms,
            });

            let started = Instant::now();
            let completion = job.start(lease).await;
            shared.record(job_id, worker_id, started.elapsed(), &completion.outcome);

            let next = checkout.release_and_drain();
            completion.deliver();

            match next {
                Some((worker, next_job)) => {
                    checkout.rearm(worker);
                    job = next_job;
                }
                None => return,
            }
        }
    }
}

/// Owns a busy worker while a task runs jobs on it.
///
/// If the task is torn down before the worker is released (the runtime
/// shuts down mid-job, or the task is never polled), dropping the checkout
/// still puts the worker back and passes any waiting job on. Each hop
/// drains one queued entry; on a runtime that is shutting down the respawned
/// task is dropped straight away and the chain ends with the worker idle.
struct Checkout<U: Send + Sync + 'static> {
    shared: Arc<Shared<U>>,
    worker: Option<WorkerHandle<U>>,
}

impl<U: Send + Sync + 'static> Checkout<U> {
    fn new(shared: Arc<Shared<U>>, worker: WorkerHandle<U>) -> Self {
        Self {
            shared,
            worker: Some(worker),
        }
    }

    fn lease(&self) -> Option<(WorkerId, WorkerLease<U>)> {
        self.worker.as_ref().map(|w| (w.id(), w.lease()))
    }

    fn release_and_drain(&mut self) -> Option<(WorkerHandle<U>, PendingJob<U>)> {
        let worker = self.worker.take()?;
        self.shared.lock().release_and_drain(worker)
    }

    fn rearm(&mut self, worker: WorkerHandle<U>) {
        self.worker = Some(worker);
    }
}

impl<U: Send + Sync + 'static> Drop for Checkout<U> {
    fn drop(&mut self) {
        let Some((worker, job)) = self.release_and_drain() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let checkout = Checkout::new(Arc::clone(&self.shared), worker);
            runtime.spawn(Shared::drive(checkout, job));
            return;
        }

        // Nothing left to run on. Abandon the queue but keep the pool whole.
        let mut next = Some((worker, job));
        while let Some((worker, job)) = next.take() {
            tracing::warn!(job_id = %job.id, "No runtime to continue draining, job abandoned");
            drop(job);
            next = self.shared.lock().release_and_drain(worker);
        }
    }
}
