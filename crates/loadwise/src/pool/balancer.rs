//! The dispatcher's decision loop.
//!
//! [`Balancer`] is the single owner of the [`LoadHeap`]. It waits on three
//! event sources at once: new requests on the inbound queue, completion
//! notifications from workers, and control messages from the dispatcher
//! handle. No other task touches the heap, so heap mutation needs no locking.
//!
//! ## Arrival
//!
//! The least-loaded worker is popped, its load incremented, and it is pushed
//! back *before* the request is delivered. If the worker's private queue is
//! full, the hand-off races against the completion channel so one slow worker
//! can never stall the accounting for the others. The optimistic increment
//! means a worker that is slow to accept looks busier than it is, which steers
//! subsequent requests elsewhere.
//!
//! ## Completion
//!
//! The reporting worker is removed at its recorded heap position, its load
//! decremented, and it is pushed back.
//!
//! `tokio::select!` is used unbiased throughout, so when several sources are
//! ready the branch taken is random.

use super::snapshot::{PoolSnapshot, WorkerSnapshot};
use crate::{JobRequest, LoadHeap, WorkerId};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio_util::sync::CancellationToken;

/// Requests the dispatcher handle can make of the decision loop.
#[derive(Debug)]
pub(crate) enum Control {
    Snapshot {
        response: oneshot::Sender<PoolSnapshot>,
    },
}

#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    assigned: u64,
    completed: u64,
}

pub(crate) struct Balancer<T> {
    heap: LoadHeap,
    workers: Vec<mpsc::Sender<JobRequest<T>>>,
    tallies: Vec<Tally>,
    inbound: mpsc::Receiver<JobRequest<T>>,
    done: mpsc::Receiver<WorkerId>,
    control: mpsc::Receiver<Control>,
    shutdown_token: CancellationToken,
}

impl<T> Balancer<T>
where
    T: Send + 'static,
{
    /// Builds a decision loop over the given worker queues. Worker `i` is
    /// identified as `WorkerId(i)` on the completion channel.
    pub(crate) fn new(
        workers: Vec<mpsc::Sender<JobRequest<T>>>,
        inbound: mpsc::Receiver<JobRequest<T>>,
        done: mpsc::Receiver<WorkerId>,
        control: mpsc::Receiver<Control>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let pool_size = workers.len();
        Self {
            heap: LoadHeap::new(pool_size),
            tallies: vec![Tally::default(); pool_size],
            workers,
            inbound,
            done,
            control,
            shutdown_token,
        }
    }

    /// Runs until shutdown is requested or every submitter is gone, then
    /// drains.
    pub(crate) async fn run(mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Decision loop started with {} workers", self.workers.len());

        loop {
            tokio::select! {
                request = self.inbound.recv() => match request {
                    Some(request) => self.dispatch(request).await,
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("All submitters dropped");
                        break;
                    }
                },
                Some(worker) = self.done.recv() => self.complete(worker),
                Some(control) = self.control.recv() => self.handle_control(control),
                () = self.shutdown_token.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::info!("Decision loop received shutdown signal");
                    break;
                }
            }
        }

        self.drain().await;
    }

    /// Stop accepting requests, deliver the ones already queued, close every
    /// worker queue, and keep accounting until all workers have exited.
    async fn drain(mut self) {
        self.inbound.close();

        let mut _buffered = 0_usize;
        while let Some(request) = self.inbound.recv().await {
            _buffered += 1;
            self.dispatch(request).await;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Dispatched {_buffered} buffered requests, closing {} worker queues",
            self.workers.len()
        );
        self.workers.clear();

        loop {
            tokio::select! {
                worker = self.done.recv() => match worker {
                    Some(worker) => self.complete(worker),
                    None => break,
                },
                Some(control) = self.control.recv() => self.handle_control(control),
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Decision loop stopped ({} jobs completed, {} outstanding)",
            self.tallies.iter().map(|t| t.completed).sum::<u64>(),
            self.snapshot().total_load()
        );
    }

    async fn dispatch(&mut self, request: JobRequest<T>) {
        let Some(worker) = self.heap.pop_min() else {
            #[cfg(feature = "tracing")]
            tracing::error!("Load heap is empty, rejecting request");
            request.reject();
            return;
        };
        let load = self.heap.load(worker) + 1;
        self.heap.set_load(worker, load);
        self.heap.push(worker);
        self.tallies[worker.get()].assigned += 1;
        debug_assert!(self.heap.is_consistent(), "heap corrupted after dispatch");

        #[cfg(feature = "tracing")]
        tracing::trace!("Dispatching job to {worker} (load {load})");

        self.deliver(worker, request).await;
    }

    /// Hands `request` to `worker`'s private queue, servicing completions and
    /// control messages for as long as that queue stays full.
    async fn deliver(&mut self, worker: WorkerId, request: JobRequest<T>) {
        let Some(tx) = self.workers.get(worker.get()).cloned() else {
            self.reject(worker, request);
            return;
        };

        let request = match tx.try_send(request) {
            Ok(()) => return,
            Err(TrySendError::Closed(request)) => {
                self.reject(worker, request);
                return;
            }
            Err(TrySendError::Full(request)) => request,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!("{worker} queue is full, waiting for room");

        let reserve = tx.reserve();
        tokio::pin!(reserve);

        loop {
            tokio::select! {
                permit = &mut reserve => {
                    match permit {
                        Ok(permit) => permit.send(request),
                        Err(_) => self.reject(worker, request),
                    }
                    return;
                }
                Some(done) = self.done.recv() => self.complete(done),
                Some(control) = self.control.recv() => self.handle_control(control),
            }
        }
    }

    fn complete(&mut self, worker: WorkerId) {
        let Some(index) = self.heap.position(worker) else {
            #[cfg(feature = "tracing")]
            tracing::error!("Completion from {worker} which is not in the heap");
            return;
        };
        let removed = self.heap.remove_at(index);
        debug_assert_eq!(removed, Some(worker), "stale heap index for {worker}");

        let load = self.heap.load(worker);
        debug_assert!(load > 0, "completion from idle {worker}");
        self.heap.set_load(worker, load.saturating_sub(1));
        self.heap.push(worker);

        let tally = &mut self.tallies[worker.get()];
        tally.completed += 1;
        debug_assert_eq!(
            (tally.assigned - tally.completed) as usize,
            self.heap.load(worker),
            "load accounting diverged for {worker}"
        );
        debug_assert!(self.heap.is_consistent(), "heap corrupted after completion");
    }

    /// Rolls back the optimistic increment for a request that never reached
    /// `worker` and answers it with a rejection.
    fn reject(&mut self, worker: WorkerId, request: JobRequest<T>) {
        #[cfg(feature = "tracing")]
        tracing::warn!("{worker} queue is closed, rejecting job");

        if let Some(index) = self.heap.position(worker) {
            self.heap.remove_at(index);
            let load = self.heap.load(worker);
            self.heap.set_load(worker, load.saturating_sub(1));
            self.heap.push(worker);
            let tally = &mut self.tallies[worker.get()];
            tally.assigned = tally.assigned.saturating_sub(1);
        }
        request.reject();
    }

    fn handle_control(&self, control: Control) {
        match control {
            Control::Snapshot { response } => {
                if response.send(self.snapshot()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Snapshot requester went away");
                }
            }
        }
    }

    fn snapshot(&self) -> PoolSnapshot {
        let workers = self
            .tallies
            .iter()
            .enumerate()
            .map(|(raw, tally)| {
                let id = WorkerId::new(raw);
                WorkerSnapshot {
                    id,
                    load: self.heap.load(id),
                    assigned: tally.assigned,
                    completed: tally.completed,
                    position: self.heap.position(id),
                }
            })
            .collect();

        PoolSnapshot {
            workers,
            heap_consistent: self.heap.is_consistent(),
        }
    }
}
