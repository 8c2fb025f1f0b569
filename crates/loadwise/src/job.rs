//! Units of work accepted by the dispatcher.
//!
//! A [`JobRequest`] pairs a [`Job`] with the channel its outcome must be
//! delivered on. Requests are created by the caller and consumed exactly once
//! by exactly one worker. There is no identity beyond the closure and the
//! result channel; callers that need correlation carry it in `T`.

use core::{any::Any, fmt, panic::AssertUnwindSafe};
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Result delivered on a request's result channel.
pub type JobOutcome<T> = Result<T, JobError>;

/// Why a job produced no value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum JobError {
    /// The job body panicked. The worker recovered and keeps serving.
    #[error("Job panicked: {message}")]
    Panicked { message: String },

    /// The request could not be handed to a worker because the pool was being
    /// torn down.
    #[error("Job was rejected before reaching a worker")]
    Rejected,
}

impl JobError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked { message }
    }
}

/// A zero-argument unit of work producing a `T`.
///
/// The body is async so it may await timers or I/O without holding a runtime
/// thread. Use [`Job::from_fn`] for plain synchronous closures.
pub struct Job<T> {
    task: Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>,
}

impl<T> Job<T>
where
    T: Send + 'static,
{
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            task: Box::new(move || f().boxed()),
        }
    }

    /// Wraps a synchronous closure. It runs inline on the worker's task.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::new(move || async move { f() })
    }

    /// Runs the job to completion, converting a panic into
    /// [`JobError::Panicked`].
    pub(crate) async fn run(self) -> JobOutcome<T> {
        let task = self.task;
        AssertUnwindSafe(async move { task().await })
            .catch_unwind()
            .await
            .map_err(JobError::from_panic)
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}

/// A [`Job`] together with the destination of its outcome.
pub struct JobRequest<T> {
    job: Job<T>,
    reply: mpsc::Sender<JobOutcome<T>>,
}

impl<T> JobRequest<T>
where
    T: Send + 'static,
{
    /// Creates a request whose outcome is sent on `reply`.
    ///
    /// Several requests may share one sender; outcomes then arrive in
    /// completion order, which is not submission order across workers.
    pub fn new(job: Job<T>, reply: mpsc::Sender<JobOutcome<T>>) -> Self {
        Self { job, reply }
    }

    /// Creates a request with its own result channel of the given capacity.
    pub fn with_reply_channel(job: Job<T>, capacity: usize) -> (Self, mpsc::Receiver<JobOutcome<T>>) {
        let (reply, rx) = mpsc::channel(capacity.max(1));
        (Self { job, reply }, rx)
    }

    pub(crate) fn into_parts(self) -> (Job<T>, mpsc::Sender<JobOutcome<T>>) {
        (self.job, self.reply)
    }

    /// Answers the request with [`JobError::Rejected`] without running it.
    ///
    /// The decision loop must not wait on a caller's channel, so a full
    /// result channel gets the outcome from a detached task instead. The
    /// outcome is only discarded when the receiver is gone.
    pub(crate) fn reject(self) {
        match self.reply.try_send(Err(JobError::Rejected)) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => {
                let reply = self.reply;
                tokio::spawn(async move {
                    if reply.send(outcome).await.is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Result receiver dropped before rejection was reported");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Result receiver dropped, discarding rejection");
            }
        }
    }
}

impl<T> fmt::Debug for JobRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("reply_closed", &self.reply.is_closed())
            .finish_non_exhaustive()
    }
}
