use crate::{Error, Result};
use core::time::Duration;

/// Number of workers used by [`DispatcherConfig::default`].
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Depth of each worker's private job queue.
///
/// Deep enough that a burst of dispatches to a single worker is buffered
/// instead of stalling the decision loop on every hand-off.
pub const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 100;

/// Depth of the dispatcher's inbound request queue.
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

/// How long [`Dispatcher::shutdown`](crate::Dispatcher::shutdown) waits for
/// in-flight work before aborting the pool.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// What [`Submitter::submit`](crate::Submitter::submit) does when the inbound
/// queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverflowPolicy {
    /// Wait until the decision loop frees a slot.
    #[default]
    Block,
    /// Fail immediately with [`Error::QueueFull`].
    Reject,
}

/// Construction parameters for a [`Dispatcher`](crate::Dispatcher).
///
/// The pool size is fixed for the lifetime of the dispatcher. All capacities
/// must be non-zero; [`DispatcherConfig::validate`] enforces this before any
/// task is spawned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of persistent workers.
    pub pool_size: usize,
    /// Capacity of each worker's private queue.
    pub worker_queue_capacity: usize,
    /// Capacity of the inbound request queue shared by all submitters.
    pub inbound_capacity: usize,
    /// Behavior of `submit` when the inbound queue is full.
    pub overflow: OverflowPolicy,
    /// Upper bound on the time `shutdown` spends joining the pool.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            worker_queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            overflow: OverflowPolicy::Block,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    /// Default configuration with `pool_size` workers.
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Self::default()
        }
    }

    /// Checks that every size is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the pool size or any queue capacity
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "pool_size must be greater than 0".to_owned(),
            });
        }
        if self.worker_queue_capacity == 0 {
            return Err(Error::InvalidConfig {
                reason: "worker_queue_capacity must be greater than 0".to_owned(),
            });
        }
        if self.inbound_capacity == 0 {
            return Err(Error::InvalidConfig {
                reason: "inbound_capacity must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }

    /// Capacity of the completion-notification channel.
    ///
    /// Every worker has at most one notification in flight before it blocks,
    /// and the decision loop drains the channel in all of its wait states.
    pub(crate) const fn completion_capacity(&self) -> usize {
        self.pool_size
    }
}
