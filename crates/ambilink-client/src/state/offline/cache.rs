//! Memory-bounded slice cache.
//!
//! The request thread fills slices strictly in index order and evicts the
//! ones the audio thread has moved past; the audio thread marks the slice it
//! reads and copies samples out of it. `next_to_fetch` is published with
//! release ordering after a slice is stored, so a reader that observes
//! `index < next_to_fetch` also observes the slice contents.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::types::DirectionWithDistance;

/// Samples of one slice.
pub type Slice = Box<[DirectionWithDistance]>;

/// Indexed cache of optional slices covering a whole animation.
#[derive(Debug)]
pub struct SliceCache {
    slices: Vec<RwLock<Option<Slice>>>,
    max_cached: usize,
    next_to_fetch: AtomicUsize,
    being_read: AtomicUsize,
    eviction_frontier: AtomicUsize,
}

impl SliceCache {
    /// Cache for `num_slices` slices keeping at most `max_cached` resident.
    pub fn new(num_slices: usize, max_cached: usize) -> Self {
        Self {
            slices: (0..num_slices).map(|_| RwLock::new(None)).collect(),
            max_cached: max_cached.max(1),
            next_to_fetch: AtomicUsize::new(0),
            being_read: AtomicUsize::new(0),
            eviction_frontier: AtomicUsize::new(0),
        }
    }

    /// Number of slices in the animation.
    pub fn num_slices(&self) -> usize {
        self.slices.len()
    }

    /// Resident slice limit.
    pub fn max_cached(&self) -> usize {
        self.max_cached
    }

    /// Index of the next slice to fetch.
    pub fn next_to_fetch(&self) -> usize {
        self.next_to_fetch.load(Ordering::Acquire)
    }

    /// Slice the audio thread reads (or waits for).
    pub fn being_read(&self) -> usize {
        self.being_read.load(Ordering::Acquire)
    }

    /// Returns true if another slice should be fetched now.
    ///
    /// Holds while slices remain and `next_to_fetch - being_read + 1` stays
    /// within the resident limit.
    pub fn wants_fetch(&self) -> bool {
        let next = self.next_to_fetch();
        next < self.slices.len() && next < self.being_read().saturating_add(self.max_cached)
    }

    /// Store the next slice in order.
    pub fn store(&self, index: usize, samples: Slice) {
        debug_assert_eq!(index, self.next_to_fetch(), "slices are fetched in order");
        let Some(slot) = self.slices.get(index) else {
            return;
        };
        *slot.write() = Some(samples);
        self.next_to_fetch.store(index + 1, Ordering::Release);
    }

    /// Returns true once slice `index` has been fetched.
    pub fn is_fetched(&self, index: usize) -> bool {
        index < self.next_to_fetch()
    }

    /// Returns true if slice `index` is fetched and not yet evicted.
    pub fn is_resident(&self, index: usize) -> bool {
        self.slices.get(index).is_some_and(|slot| slot.read().is_some())
    }

    /// Record the slice the audio thread is about to read.
    pub fn mark_being_read(&self, index: usize) {
        self.being_read.store(index, Ordering::Release);
    }

    /// Copy one sample out of a resident slice.
    pub fn sample(&self, index: usize, frame: usize) -> Option<DirectionWithDistance> {
        self.slices.get(index)?.read().as_ref()?.get(frame).copied()
    }

    /// Clear fetched slices before the one being read.
    ///
    /// Does nothing when the whole animation fits the resident limit. Returns
    /// the number of slices cleared.
    pub fn evict_consumed(&self) -> usize {
        if self.slices.len() <= self.max_cached {
            return 0;
        }

        let frontier = self.eviction_frontier.load(Ordering::Acquire);
        let target = self.being_read().min(self.next_to_fetch());
        if target <= frontier {
            return 0;
        }

        for slot in &self.slices[frontier..target] {
            *slot.write() = None;
        }
        self.eviction_frontier.store(target, Ordering::Release);
        target - frontier
    }

    /// Number of slices currently holding samples.
    pub fn resident_count(&self) -> usize {
        self.slices.iter().filter(|slot| slot.read().is_some()).count()
    }
}
