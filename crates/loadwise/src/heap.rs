//! Indexed binary min-heap ranking workers by outstanding load.
//!
//! [`LoadHeap`] is the ordering structure behind the dispatcher's
//! least-loaded selection. It keeps two pieces of state:
//!
//! - a slot per worker holding its `load` and its current `index` in the heap
//!   array (`None` while the worker is not resident), and
//! - the heap array itself, a `Vec<WorkerId>` ordered so that no worker has a
//!   smaller load than its parent.
//!
//! Every structural change (push, pop, swap, removal) rewrites the `index` of
//! each worker it moves. This is what makes [`LoadHeap::remove_at`] O(log n)
//! for an arbitrary worker: the decision loop looks up the position of the
//! worker that just reported a completion instead of scanning the pool.
//!
//! Loads only change while a worker is out of the heap. The decision loop
//! pops (or removes) the worker, updates its load with
//! [`LoadHeap::set_load`], and pushes it back. `push` of a resident worker and
//! `set_load` on one are refused, so misuse cannot break heap order.
//!
//! Ties between equal loads are broken by heap layout, not insertion order.

use core::fmt;

/// Identity of a worker within a fixed-size pool.
///
/// Ids are dense (`0..pool_size`) and minted by the dispatcher at
/// construction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerId(usize);

impl WorkerId {
    pub(crate) const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the zero-based ordinal of this worker in its pool.
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    load: usize,
    index: Option<usize>,
}

/// Array-backed min-heap of workers keyed by load.
#[derive(Debug)]
pub struct LoadHeap {
    slots: Vec<Slot>,
    heap: Vec<WorkerId>,
}

impl LoadHeap {
    /// Creates a heap holding `pool_size` idle workers.
    pub fn new(pool_size: usize) -> Self {
        let mut heap = Self {
            slots: vec![Slot::default(); pool_size],
            heap: Vec::with_capacity(pool_size),
        };
        for raw in 0..pool_size {
            heap.push(WorkerId::new(raw));
        }
        heap
    }

    /// Number of workers currently resident in the heap.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of workers the heap was built for, resident or not.
    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    /// Returns the least-loaded worker without removing it.
    pub fn peek_min(&self) -> Option<WorkerId> {
        self.heap.first().copied()
    }

    /// Removes and returns the least-loaded worker.
    ///
    /// Returns `None` only if the heap is empty.
    pub fn pop_min(&mut self) -> Option<WorkerId> {
        let last = self.heap.len().checked_sub(1)?;
        self.swap(0, last);
        self.sift_down(0, last);
        self.take_last()
    }

    /// Inserts a worker that is not currently resident.
    ///
    /// Returns `false` and leaves the heap untouched if `worker` is already
    /// resident or does not belong to this pool.
    pub fn push(&mut self, worker: WorkerId) -> bool {
        let index = self.heap.len();
        let Some(slot) = self.slots.get_mut(worker.0) else {
            return false;
        };
        if slot.index.is_some() {
            return false;
        }
        slot.index = Some(index);
        self.heap.push(worker);
        self.sift_up(index);
        true
    }

    /// Removes the worker at heap position `index`.
    ///
    /// Returns `None` if `index` is out of bounds.
    pub fn remove_at(&mut self, index: usize) -> Option<WorkerId> {
        let last = self.heap.len().checked_sub(1)?;
        if index > last {
            return None;
        }
        if index != last {
            self.swap(index, last);
            if !self.sift_down(index, last) {
                self.sift_up(index);
            }
        }
        self.take_last()
    }

    /// Current heap position of `worker`, or `None` if it is not resident.
    pub fn position(&self, worker: WorkerId) -> Option<usize> {
        self.slots.get(worker.0).and_then(|slot| slot.index)
    }

    /// Recorded load of `worker`, or 0 for a worker outside this pool.
    pub fn load(&self, worker: WorkerId) -> usize {
        self.slots.get(worker.0).map_or(0, |slot| slot.load)
    }

    /// Overwrites the load of a worker that has been taken out of the heap.
    ///
    /// Returns `false` and changes nothing if `worker` is still resident or
    /// does not belong to this pool. A resident worker's load cannot change
    /// without breaking heap order.
    pub fn set_load(&mut self, worker: WorkerId, load: usize) -> bool {
        match self.slots.get_mut(worker.0) {
            Some(slot) if slot.index.is_none() => {
                slot.load = load;
                true
            }
            _ => false,
        }
    }

    /// Verifies heap order and that every resident worker's index matches its
    /// array position.
    pub fn is_consistent(&self) -> bool {
        let ordered = self.heap.iter().enumerate().all(|(i, worker)| {
            self.slots[worker.0].index == Some(i)
                && (i == 0 || self.load_at((i - 1) / 2) <= self.load_at(i))
        });
        let resident = self.slots.iter().filter(|s| s.index.is_some()).count();
        ordered && resident == self.heap.len()
    }

    fn take_last(&mut self) -> Option<WorkerId> {
        let worker = self.heap.pop()?;
        self.slots[worker.0].index = None;
        Some(worker)
    }

    fn load_at(&self, i: usize) -> usize {
        self.slots[self.heap[i].0].load
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.load_at(i) < self.load_at(j)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.slots[self.heap[i].0].index = Some(i);
        self.slots[self.heap[j].0].index = Some(j);
    }

    fn sift_up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent) {
                break;
            }
            self.swap(parent, j);
            j = parent;
        }
    }

    /// Sifts the element at `start` down within `heap[..n]`. Returns whether it
    /// moved.
    fn sift_down(&mut self, start: usize, n: usize) -> bool {
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                child = right;
            }
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    const SEEDS: [u64; 4] = [1, 7, 42, 0xdead_beef];
    const STEPS: usize = 2_000;

    fn assert_consistent(heap: &LoadHeap) {
        assert!(heap.is_consistent(), "heap corrupted: {heap:?}");
        for (i, worker) in heap.heap.iter().enumerate() {
            assert_eq!(heap.position(*worker), Some(i));
        }
    }

    #[test]
    fn new_heap_holds_every_worker_idle() {
        let heap = LoadHeap::new(5);
        assert_eq!(heap.len(), 5);
        assert_eq!(heap.pool_size(), 5);
        assert_consistent(&heap);
        for raw in 0..5 {
            assert_eq!(heap.load(WorkerId::new(raw)), 0);
            assert!(heap.position(WorkerId::new(raw)).is_some());
        }
    }

    #[test]
    fn pop_min_returns_least_loaded() {
        let mut heap = LoadHeap::new(4);
        // Load workers as 3, 1, 2, 0.
        for (raw, load) in [(0, 3), (1, 1), (2, 2), (3, 0)] {
            let worker = WorkerId::new(raw);
            let index = heap.position(worker).unwrap();
            assert_eq!(heap.remove_at(index), Some(worker));
            heap.set_load(worker, load);
            heap.push(worker);
            assert_consistent(&heap);
        }

        let order: Vec<_> = core::iter::from_fn(|| heap.pop_min())
            .map(WorkerId::get)
            .collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert!(heap.is_empty());
        assert_eq!(heap.pop_min(), None);
    }

    #[test]
    fn popped_worker_has_no_position() {
        let mut heap = LoadHeap::new(3);
        let worker = heap.pop_min().unwrap();
        assert_eq!(heap.position(worker), None);
        assert_eq!(heap.len(), 2);
        assert_consistent(&heap);

        heap.set_load(worker, 1);
        heap.push(worker);
        assert!(heap.position(worker).is_some());
        assert_ne!(heap.peek_min(), Some(worker));
    }

    #[test]
    fn refuses_operations_that_would_break_order() {
        let mut heap = LoadHeap::new(3);
        let resident = heap.peek_min().unwrap();
        assert!(!heap.push(resident));
        assert!(!heap.set_load(resident, 9));
        assert_eq!(heap.load(resident), 0);
        assert_eq!(heap.len(), 3);
        assert_consistent(&heap);

        let foreign = WorkerId::new(3);
        assert!(!heap.push(foreign));
        assert!(!heap.set_load(foreign, 1));
        assert_eq!(heap.load(foreign), 0);
        assert_eq!(heap.position(foreign), None);
        assert_consistent(&heap);

        let worker = heap.pop_min().unwrap();
        assert!(heap.set_load(worker, 2));
        assert!(heap.push(worker));
        assert_eq!(heap.load(worker), 2);
        assert_consistent(&heap);
    }

    #[test]
    fn remove_at_out_of_bounds_is_none() {
        let mut heap = LoadHeap::new(2);
        assert_eq!(heap.remove_at(2), None);
        assert_eq!(heap.len(), 2);

        let mut empty = LoadHeap::new(0);
        assert_eq!(empty.remove_at(0), None);
        assert_eq!(empty.pop_min(), None);
        assert_eq!(empty.peek_min(), None);
    }

    #[test]
    fn remove_at_middle_restores_order_both_ways() {
        let mut heap = LoadHeap::new(7);
        let loads = [0, 5, 1, 6, 7, 2, 3];
        for (raw, load) in loads.into_iter().enumerate() {
            let worker = WorkerId::new(raw);
            heap.remove_at(heap.position(worker).unwrap());
            heap.set_load(worker, load);
            heap.push(worker);
        }
        assert_consistent(&heap);

        // Removing a worker whose replacement must sift up, then one that
        // must sift down.
        for raw in [4, 1, 2] {
            let worker = WorkerId::new(raw);
            let index = heap.position(worker).unwrap();
            assert_eq!(heap.remove_at(index), Some(worker));
            assert_eq!(heap.position(worker), None);
            assert_consistent(&heap);
        }
        assert_eq!(heap.len(), 4);
    }

    /// Replays the decision loop's dispatch and completion steps with random
    /// choices and checks the heap against a plain load table after every
    /// step.
    #[test]
    fn random_dispatch_and_completion_sequences_keep_invariants() {
        for seed in SEEDS {
            let mut rng = StdRng::seed_from_u64(seed);
            let pool_size = rng.random_range(1..=16);
            let mut heap = LoadHeap::new(pool_size);
            let mut model = vec![0_usize; pool_size];

            for _ in 0..STEPS {
                let outstanding: Vec<_> = (0..pool_size).filter(|&w| model[w] > 0).collect();
                let dispatch = outstanding.is_empty() || rng.random_bool(0.55);

                if dispatch {
                    let min = *model.iter().min().unwrap();
                    let worker = heap.pop_min().unwrap();
                    assert_eq!(
                        model[worker.get()],
                        min,
                        "seed {seed}: selected worker is not least loaded"
                    );
                    heap.set_load(worker, heap.load(worker) + 1);
                    heap.push(worker);
                    model[worker.get()] += 1;
                } else {
                    let raw = outstanding[rng.random_range(0..outstanding.len())];
                    let worker = WorkerId::new(raw);
                    let index = heap.position(worker).unwrap();
                    assert_eq!(heap.remove_at(index), Some(worker));
                    heap.set_load(worker, heap.load(worker) - 1);
                    heap.push(worker);
                    model[raw] -= 1;
                }

                assert_consistent(&heap);
                assert_eq!(heap.len(), pool_size);
                for (raw, load) in model.iter().enumerate() {
                    assert_eq!(heap.load(WorkerId::new(raw)), *load, "seed {seed}");
                }
            }
        }
    }

    /// Arbitrary interleavings of the raw operations, including workers that
    /// stay out of the heap for several steps.
    #[test]
    fn random_raw_operations_keep_indices_live() {
        for seed in SEEDS {
            let mut rng = StdRng::seed_from_u64(seed);
            let pool_size = rng.random_range(2..=12);
            let mut heap = LoadHeap::new(pool_size);
            let mut outside: Vec<WorkerId> = Vec::new();

            for _ in 0..STEPS {
                match rng.random_range(0..3) {
                    0 if !heap.is_empty() => {
                        let min_load = heap.heap.iter().map(|w| heap.load(*w)).min().unwrap();
                        let worker = heap.pop_min().unwrap();
                        assert_eq!(heap.load(worker), min_load);
                        outside.push(worker);
                    }
                    1 if !heap.is_empty() => {
                        let index = rng.random_range(0..heap.len());
                        let expected = heap.heap[index];
                        assert_eq!(heap.remove_at(index), Some(expected));
                        outside.push(expected);
                    }
                    _ if !outside.is_empty() => {
                        let worker = outside.swap_remove(rng.random_range(0..outside.len()));
                        heap.set_load(worker, rng.random_range(0..8));
                        heap.push(worker);
                    }
                    _ => {}
                }

                assert_consistent(&heap);
                assert_eq!(heap.len() + outside.len(), pool_size);
                for worker in &outside {
                    assert_eq!(heap.position(*worker), None);
                }
            }
        }
    }
}
