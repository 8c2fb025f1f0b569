use crate::{JobRequest, WorkerId};
use tokio::sync::mpsc;

/// Worker task that executes [`JobRequest`]s from its private queue.
///
/// Jobs run one at a time, in the order the decision loop delivered them.
/// After each job the outcome is sent on the request's result channel and
/// the worker's id is reported on the completion channel so the decision loop
/// can re-rank it. A panicking job is reported as
/// [`JobError::Panicked`](crate::JobError::Panicked) and still produces a
/// completion notification.
///
/// The worker never reads or writes its own load or heap position.
///
/// # Arguments
///
/// - `worker_id`: Identity reported on the completion channel.
/// - `rx`: The worker's private queue. The loop ends once the decision loop
///   drops its sender and the queue is drained.
/// - `done`: Completion-notification channel shared by all workers.
pub(crate) async fn worker_loop<T>(
    worker_id: WorkerId,
    mut rx: mpsc::Receiver<JobRequest<T>>,
    done: mpsc::Sender<WorkerId>,
) where
    T: Send + 'static,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("{worker_id} started");

    while let Some(request) = rx.recv().await {
        let (job, reply) = request.into_parts();
        let outcome = job.run().await;

        #[cfg(feature = "tracing")]
        {
            if let Err(e) = &outcome {
                tracing::warn!("{worker_id} job failed: {e}");
            }
        }

        if reply.send(outcome).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("{worker_id} result receiver dropped, discarding outcome");
        }

        if done.send(worker_id).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("{worker_id} completion channel closed");
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("{worker_id} stopped");
}
