//! Submitted jobs: the type-erased entry the dispatcher runs, and the
//! [`JobHandle`] the caller awaits.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use palettepool_core::{panic_message, JobId};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::JobError;
use crate::handle::WorkerLease;

/// How a job ended, as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JobOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

/// A finished job whose result has not been handed to the caller yet.
///
/// The dispatcher releases the worker first and only then calls
/// [`deliver`](Self::deliver), so a caller that sees its result can rely
/// on the worker already being free.
pub(crate) struct Completion {
    pub outcome: JobOutcome,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Completion {
    pub fn deliver(self) {
        (self.deliver)();
    }
}

type RunFn<U> = Box<dyn FnOnce(WorkerLease<U>) -> BoxFuture<'static, Completion> + Send>;

/// A job with its result type erased, ready to run on any worker.
pub(crate) struct PendingJob<U> {
    pub id: JobId,
    pub submitted_at: Instant,
    run: RunFn<U>,
}

impl<U> std::fmt::Debug for PendingJob<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingJob")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}

impl<U: Send + Sync + 'static> PendingJob<U> {
    /// Wrap `job` and create the handle its caller will await.
    pub fn new<F, Fut, T, E>(id: JobId, job: F) -> (Self, JobHandle<T, E>)
    where
        F: FnOnce(WorkerLease<U>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let run: RunFn<U> = Box::new(move |lease| {
            async move {
                let result = AssertUnwindSafe(async move { job(lease).await })
                    .catch_unwind()
                    .await;

                let (outcome, reply) = match result {
                    Ok(Ok(value)) => (JobOutcome::Succeeded, Ok(value)),
                    Ok(Err(e)) => (JobOutcome::Failed(e.to_string()), Err(JobError::Failed(e))),
                    Err(payload) => {
                        let msg = panic_message(&*payload);
                        (JobOutcome::Panicked(msg.clone()), Err(JobError::Panicked(msg)))
                    }
                };

                Completion {
                    outcome,
                    deliver: Box::new(move || {
                        // The caller may have dropped its handle; that is fine.
                        let _ = tx.send(reply);
                    }),
                }
            }
            .boxed()
        });

        let pending = Self {
            id,
            submitted_at: Instant::now(),
            run,
        };
        (pending, JobHandle::waiting(id, rx))
    }

    /// Start the job on a leased worker.
    pub fn start(self, lease: WorkerLease<U>) -> BoxFuture<'static, Completion> {
        (self.run)(lease)
    }
}

type Reply<T, E> = Result<T, JobError<E>>;

enum HandleState<T, E> {
    Waiting(oneshot::Receiver<Reply<T, E>>),
    Ready(Option<Reply<T, E>>),
}

/// The caller's side of a submitted job. Resolves to the job's result.
///
/// Dropping the handle does not cancel the job: once accepted, a job
/// always runs to completion on its worker.
pub struct JobHandle<T, E> {
    id: JobId,
    state: HandleState<T, E>,
}

// No field is ever pinned structurally.
impl<T, E> Unpin for JobHandle<T, E> {}

impl<T, E> JobHandle<T, E> {
    fn waiting(id: JobId, rx: oneshot::Receiver<Reply<T, E>>) -> Self {
        Self {
            id,
            state: HandleState::Waiting(rx),
        }
    }

    /// A handle that resolves immediately, used for rejected submissions.
    pub(crate) fn ready(id: JobId, reply: Reply<T, E>) -> Self {
        Self {
            id,
            state: HandleState::Ready(Some(reply)),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait at most `timeout` for the result.
    ///
    /// On expiry resolves to [`JobError::TimedOut`]; the job keeps its
    /// worker until it finishes on its own.
    pub async fn with_timeout(self, timeout: Duration) -> Reply<T, E> {
        tokio::time::timeout(timeout, self)
            .await
            .unwrap_or(Err(JobError::TimedOut(timeout)))
    }
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = Reply<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|reply| reply.unwrap_or(Err(JobError::Abandoned))),
            HandleState::Ready(reply) => {
                Poll::Ready(reply.take().unwrap_or(Err(JobError::Abandoned)))
            }
        }
    }
}

impl<T, E> std::fmt::Debug for JobHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            HandleState::Waiting(_) => "waiting",
            HandleState::Ready(_) => "ready",
        };
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use palettepool_core::WorkerId;

    use super::*;
    use crate::handle::WorkerHandle;

    fn lease() -> WorkerLease<&'static str> {
        WorkerHandle::new(WorkerId(0), "unit").lease()
    }

    #[tokio::test]
    async fn success_is_delivered_only_after_deliver() {
        let (job, mut handle) =
            PendingJob::new(JobId(1), |lease: WorkerLease<&'static str>| async move {
                Ok::<_, String>(lease.len())
            });

        let completion = job.start(lease()).await;
        assert_eq!(completion.outcome, JobOutcome::Succeeded);
        assert!(futures::poll!(&mut handle).is_pending());

        completion.deliver();
        assert_eq!(handle.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn failure_keeps_the_original_error() {
        let (job, handle) = PendingJob::new(JobId(2), |_lease: WorkerLease<&'static str>| async {
            Err::<(), _>("decode failed".to_string())
        });

        let completion = job.start(lease()).await;
        assert_eq!(
            completion.outcome,
            JobOutcome::Failed("decode failed".to_string())
        );
        completion.deliver();
        assert_matches!(handle.await, Err(JobError::Failed(e)) if e == "decode failed");
    }

    #[tokio::test]
    async fn panic_inside_job_is_contained() {
        let (job, handle) =
            PendingJob::new(JobId(3), |_lease: WorkerLease<&'static str>| async {
                if true {
                    panic!("engine went away");
                }
                Ok::<(), String>(())
            });

        let completion = job.start(lease()).await;
        assert_matches!(&completion.outcome, JobOutcome::Panicked(msg) if msg == "engine went away");
        completion.deliver();
        assert_matches!(handle.await, Err(JobError::Panicked(_)));
    }

    #[tokio::test]
    async fn dropped_job_resolves_as_abandoned() {
        let (job, handle) =
            PendingJob::new(JobId(4), |_lease: WorkerLease<&'static str>| async {
                Ok::<(), String>(())
            });
        drop(job);
        assert_matches!(handle.await, Err(JobError::Abandoned));
    }

    #[tokio::test]
    async fn ready_handle_resolves_immediately() {
        let handle: JobHandle<(), String> =
            JobHandle::ready(JobId(5), Err(JobError::QueueFull { depth: 8 }));
        assert_eq!(handle.id(), JobId(5));
        assert_matches!(handle.await, Err(JobError::QueueFull { depth: 8 }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_gives_up_without_a_result() {
        let (_job, handle) =
            PendingJob::new(JobId(6), |_lease: WorkerLease<&'static str>| async {
                Ok::<(), String>(())
            });
        let result = handle.with_timeout(Duration::from_secs(2)).await;
        assert_matches!(result, Err(JobError::TimedOut(d)) if d == Duration::from_secs(2));
    }
}
