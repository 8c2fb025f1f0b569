//! Public handle for constructing, feeding and stopping a worker pool.
//!
//! [`Dispatcher::spawn`] starts `pool_size` worker tasks and the decision loop
//! on the current Tokio runtime. The returned handle is the only way to reach
//! them: requests go in through [`Dispatcher::submit`] (or a cloned
//! [`Submitter`]), observations come back through [`Dispatcher::snapshot`],
//! and [`Dispatcher::shutdown`] drains and joins everything.
//!
//! The pool keeps running while any submitter is alive. Once the dispatcher
//! and every submitter are dropped, the decision loop drains on its own.

use super::{
    balancer::{Balancer, Control},
    snapshot::PoolSnapshot,
    worker::worker_loop,
};
use crate::{
    DispatcherConfig, Error, Job, JobOutcome, JobRequest, OverflowPolicy, Result, SubmitError,
    WorkerId,
};
use core::time::Duration;
use parking_lot::Mutex;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Outstanding snapshot requests the control channel buffers.
const CONTROL_CAPACITY: usize = 16;

/// Cloneable, submit-only handle to a running [`Dispatcher`].
pub struct Submitter<T> {
    inbound: mpsc::Sender<JobRequest<T>>,
    shutdown_token: CancellationToken,
    overflow: OverflowPolicy,
}

impl<T> Clone for Submitter<T> {
    fn clone(&self) -> Self {
        Self {
            inbound: self.inbound.clone(),
            shutdown_token: self.shutdown_token.clone(),
            overflow: self.overflow,
        }
    }
}

impl<T> Submitter<T>
where
    T: Send + 'static,
{
    /// Enqueues a request on the inbound queue.
    ///
    /// With [`OverflowPolicy::Block`] this waits for room; with
    /// [`OverflowPolicy::Reject`] it behaves like [`Self::try_submit`].
    ///
    /// # Errors
    ///
    /// The request is handed back inside the error.
    ///
    /// - [`SubmitError::Shutdown`] if the dispatcher is stopping or stopped.
    /// - [`SubmitError::Full`] under the `Reject` policy when the queue is full.
    pub async fn submit(
        &self,
        request: JobRequest<T>,
    ) -> core::result::Result<(), SubmitError<T>> {
        match self.overflow {
            OverflowPolicy::Block => {
                if self.shutdown_token.is_cancelled() {
                    return Err(SubmitError::Shutdown(request));
                }
                self.inbound
                    .send(request)
                    .await
                    .map_err(|e| SubmitError::Shutdown(e.0))
            }
            OverflowPolicy::Reject => self.try_submit(request),
        }
    }

    /// Enqueues a request without waiting.
    ///
    /// # Errors
    ///
    /// The request is handed back inside the error.
    ///
    /// - [`SubmitError::Shutdown`] if the dispatcher is stopping or stopped.
    /// - [`SubmitError::Full`] if the inbound queue is at capacity.
    pub fn try_submit(&self, request: JobRequest<T>) -> core::result::Result<(), SubmitError<T>> {
        if self.shutdown_token.is_cancelled() {
            return Err(SubmitError::Shutdown(request));
        }
        match self.inbound.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(request)) => Err(SubmitError::Full(request)),
            Err(TrySendError::Closed(request)) => Err(SubmitError::Shutdown(request)),
        }
    }

    /// Submits `job` with a private result channel and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::QueueFull`] or [`Error::ServiceShutdown`] if the
    /// submission fails, or with [`Error::ChannelError`] if the pool was
    /// aborted before the job reported back.
    pub async fn call(&self, job: Job<T>) -> Result<JobOutcome<T>> {
        let (request, mut rx) = JobRequest::with_reply_channel(job, 1);
        self.submit(request).await?;
        rx.recv().await.ok_or_else(|| Error::ChannelError {
            context: "result channel closed before the job reported".to_owned(),
        })
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

struct PoolTasks {
    balancer: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// A least-loaded dispatcher over a fixed pool of workers.
pub struct Dispatcher<T> {
    submitter: Submitter<T>,
    control: mpsc::Sender<Control>,
    pool_size: usize,
    shutdown_timeout: Duration,
    tasks: Mutex<Option<PoolTasks>>,
}

impl<T> Dispatcher<T>
where
    T: Send + 'static,
{
    /// Validates `config` and spawns the workers and the decision loop on the
    /// current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `config` fails validation.
    /// - [`Error::RuntimeUnavailable`] if called outside a Tokio runtime.
    pub fn spawn(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;

        let shutdown_token = CancellationToken::new();
        let (done_tx, done_rx) = mpsc::channel(config.completion_capacity());
        let mut queues = Vec::with_capacity(config.pool_size);
        let mut workers = Vec::with_capacity(config.pool_size);

        for raw in 0..config.pool_size {
            let (tx, rx) = mpsc::channel(config.worker_queue_capacity);
            queues.push(tx);
            workers.push(runtime.spawn(worker_loop(WorkerId::new(raw), rx, done_tx.clone())));
        }
        // Only workers may hold completion senders, so the channel closes
        // exactly when the last worker exits.
        drop(done_tx);

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let balancer = Balancer::new(
            queues,
            inbound_rx,
            done_rx,
            control_rx,
            shutdown_token.clone(),
        );
        let balancer = runtime.spawn(balancer.run());

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Dispatcher started with {} workers (queue capacity {}, inbound capacity {})",
            config.pool_size,
            config.worker_queue_capacity,
            config.inbound_capacity
        );

        Ok(Self {
            submitter: Submitter {
                inbound: inbound_tx,
                shutdown_token,
                overflow: config.overflow,
            },
            control: control_tx,
            pool_size: config.pool_size,
            shutdown_timeout: config.shutdown_timeout,
            tasks: Mutex::new(Some(PoolTasks { balancer, workers })),
        })
    }

    /// Returns a cloneable handle that can only submit work.
    pub fn submitter(&self) -> Submitter<T> {
        self.submitter.clone()
    }

    /// See [`Submitter::submit`].
    ///
    /// # Errors
    ///
    /// See [`Submitter::submit`].
    pub async fn submit(
        &self,
        request: JobRequest<T>,
    ) -> core::result::Result<(), SubmitError<T>> {
        self.submitter.submit(request).await
    }

    /// See [`Submitter::try_submit`].
    ///
    /// # Errors
    ///
    /// See [`Submitter::try_submit`].
    pub fn try_submit(&self, request: JobRequest<T>) -> core::result::Result<(), SubmitError<T>> {
        self.submitter.try_submit(request)
    }

    /// See [`Submitter::call`].
    ///
    /// # Errors
    ///
    /// See [`Submitter::call`].
    pub async fn call(&self, job: Job<T>) -> Result<JobOutcome<T>> {
        self.submitter.call(job).await
    }

    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn is_shutdown(&self) -> bool {
        self.submitter.is_shutdown()
    }

    /// Asks the decision loop for the current per-worker accounting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once the decision loop has stopped.
    pub async fn snapshot(&self) -> Result<PoolSnapshot> {
        let (response, rx) = oneshot::channel();
        self.control
            .send(Control::Snapshot { response })
            .await
            .map_err(|_| Error::ServiceShutdown)?;
        rx.await.map_err(|_| Error::ServiceShutdown)
    }

    /// Gracefully stops the pool.
    ///
    /// - Refuses new submissions.
    /// - Lets the decision loop deliver every request already queued.
    /// - Closes the worker queues so workers exit after their last job.
    /// - Joins the decision loop and all workers, waiting at most
    ///   `shutdown_timeout`.
    ///
    /// Calling this more than once is a no-op after the first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] if the pool did not stop in time.
    /// The remaining tasks are aborted in that case.
    pub async fn shutdown(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.submitter.shutdown_token.cancel();

        let tasks = self.tasks.lock().take();
        let Some(PoolTasks { balancer, workers }) = tasks else {
            return Ok(());
        };

        let mut abort_handles = Vec::with_capacity(workers.len() + 1);
        abort_handles.push(balancer.abort_handle());
        abort_handles.extend(workers.iter().map(JoinHandle::abort_handle));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Waiting up to {:?} for the pool to drain",
            self.shutdown_timeout
        );

        let joined = timeout(self.shutdown_timeout, async move {
            if let Err(_e) = balancer.await {
                #[cfg(feature = "tracing")]
                tracing::error!("Decision loop task failed: {_e}");
            }
            for (_i, result) in futures::future::join_all(workers)
                .await
                .into_iter()
                .enumerate()
            {
                if let Err(_e) = result {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} task failed: {_e}");
                }
            }
        })
        .await;

        if joined.is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Graceful drain timed out, aborting remaining tasks");
            for handle in abort_handles {
                handle.abort();
            }
            return Err(Error::ShutdownTimeout(self.shutdown_timeout));
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}
