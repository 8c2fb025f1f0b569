//! Worker pool, decision loop and the public dispatcher handle.
//!
//! Each worker listens on its own bounded [`tokio::sync::mpsc`] queue and
//! runs jobs one at a time. A single decision-loop task owns the
//! [`LoadHeap`](crate::LoadHeap) and routes every request to the worker with
//! the fewest outstanding jobs. Workers and the loop communicate only through
//! channels; nothing about the ranking is shared memory.
//!
//! ## Structure
//!
//! - [`dispatcher`] - construction, submission, snapshots and shutdown.
//! - `balancer` - the decision loop.
//! - `worker` - the per-worker execution loop.
//! - [`snapshot`] - observable per-worker accounting.

mod balancer;
pub mod dispatcher;
pub mod snapshot;
mod worker;

pub use dispatcher::{Dispatcher, Submitter};
pub use snapshot::{PoolSnapshot, WorkerSnapshot};
