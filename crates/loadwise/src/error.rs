//! Error types for the dispatcher.
//!
//! [`Error`] covers everything a caller of the dispatcher handle can observe:
//! invalid configuration, inbound backpressure under
//! [`OverflowPolicy::Reject`](crate::OverflowPolicy::Reject), submissions after
//! shutdown, and a shutdown that could not join its tasks in time.
//!
//! [`SubmitError`] is the submission-side error. It carries the request that
//! could not be enqueued, the way tokio's `TrySendError` carries its value.
//!
//! Failures of individual jobs never surface here. They are delivered on the
//! job's own result channel as a [`JobError`](crate::JobError).

use crate::JobRequest;
use core::{fmt, time::Duration};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for dispatcher operations.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The supplied [`DispatcherConfig`](crate::DispatcherConfig) was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The dispatcher was constructed outside of a Tokio runtime.
    #[error("No Tokio runtime is available to spawn the worker pool")]
    RuntimeUnavailable,

    /// The inbound queue is at capacity and the overflow policy is `Reject`.
    #[error("Inbound queue is full")]
    QueueFull,

    /// The dispatcher is shutting down or has already stopped.
    #[error("Dispatcher is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Worker and decision-loop tasks did not finish within the configured
    /// shutdown timeout and were aborted.
    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Error returned by [`Submitter::submit`](crate::Submitter::submit) and
/// [`Submitter::try_submit`](crate::Submitter::try_submit).
///
/// The rejected request is handed back so the caller can retry it or answer
/// it some other way. Converts into [`Error`] with `?`, dropping the request.
#[derive(thiserror::Error)]
pub enum SubmitError<T> {
    /// The inbound queue is at capacity and the overflow policy is `Reject`,
    /// or the call did not wait.
    #[error("Inbound queue is full")]
    Full(JobRequest<T>),

    /// The dispatcher is shutting down or has already stopped.
    #[error("Dispatcher is shutting down")]
    Shutdown(JobRequest<T>),
}

impl<T> SubmitError<T> {
    /// Returns the request that could not be submitted.
    pub fn into_inner(self) -> JobRequest<T> {
        match self {
            Self::Full(request) | Self::Shutdown(request) => request,
        }
    }

    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Shutdown(_) => f.write_str("Shutdown(..)"),
        }
    }
}

impl<T> From<SubmitError<T>> for Error {
    fn from(err: SubmitError<T>) -> Self {
        match err {
            SubmitError::Full(_) => Self::QueueFull,
            SubmitError::Shutdown(_) => Self::ServiceShutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Job;

    #[tokio::test]
    async fn submit_error_hands_the_request_back() {
        let (request, mut rx) = JobRequest::with_reply_channel(Job::from_fn(|| 3_u32), 1);
        let err = SubmitError::Full(request);
        assert!(err.is_full());
        assert_eq!(format!("{err:?}"), "Full(..)");

        let request = err.into_inner();
        let (job, reply) = request.into_parts();
        reply.send(job.run().await).await.unwrap();
        assert_eq!(rx.recv().await, Some(Ok(3)));
    }

    #[test]
    fn submit_error_converts_into_error() {
        let full = SubmitError::Full(JobRequest::with_reply_channel(Job::from_fn(|| ()), 1).0);
        let shutdown =
            SubmitError::Shutdown(JobRequest::with_reply_channel(Job::from_fn(|| ()), 1).0);
        assert_eq!(Error::from(full), Error::QueueFull);
        assert_eq!(Error::from(shutdown), Error::ServiceShutdown);
    }
}
