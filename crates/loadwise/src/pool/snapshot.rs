use crate::WorkerId;

/// Point-in-time view of one worker, as recorded by the decision loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    /// Jobs assigned but not yet completion-reported.
    pub load: usize,
    /// Jobs ever assigned to this worker.
    pub assigned: u64,
    /// Completion notifications processed for this worker.
    pub completed: u64,
    /// Position in the load heap at the time of the snapshot.
    pub position: Option<usize>,
}

impl WorkerSnapshot {
    /// Jobs assigned and not yet completed, derived from the counters.
    pub const fn in_flight(&self) -> u64 {
        self.assigned - self.completed
    }
}

/// Point-in-time view of the whole pool.
///
/// Snapshots are produced by the decision loop itself, so every field is
/// mutually consistent: they are taken between two events, never during one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolSnapshot {
    /// One entry per worker, ordered by [`WorkerId`].
    pub workers: Vec<WorkerSnapshot>,
    /// Result of the heap's order and index check.
    pub heap_consistent: bool,
}

impl PoolSnapshot {
    pub fn worker(&self, id: WorkerId) -> Option<&WorkerSnapshot> {
        self.workers.get(id.get())
    }

    /// Sum of all recorded loads.
    pub fn total_load(&self) -> usize {
        self.workers.iter().map(|w| w.load).sum()
    }

    pub fn total_assigned(&self) -> u64 {
        self.workers.iter().map(|w| w.assigned).sum()
    }

    pub fn total_completed(&self) -> u64 {
        self.workers.iter().map(|w| w.completed).sum()
    }

    /// Smallest recorded load, or `None` for an empty pool.
    pub fn min_load(&self) -> Option<usize> {
        self.workers.iter().map(|w| w.load).min()
    }

    /// Loads indexed by worker ordinal.
    pub fn loads(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.load).collect()
    }
}
