//! Shared test fixtures: a programmable in-memory heap model.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_core::MemRange;

use crate::config::RemSetConfig;
use crate::region::{RegionDirectory, RegionInfo, RegionIndex, RegionKind, RegionProvider};
use crate::rem_set::RemSet;
use crate::walker::{Liveness, ObjectWalker, PointerSlot, WalkOutcome};

/// A model heap: region metadata plus a slot map standing in for object
/// layout. `walk_range` reports the recorded slots inside the range, in
/// address order, and turns unparsable if the range intersects a range
/// marked mid-allocation.
pub struct TestHeap {
    pub dir: RegionDirectory,
    slots: Mutex<BTreeMap<usize, usize>>,
    unparsable: Mutex<Vec<MemRange>>,
}

impl TestHeap {
    pub fn new(num_regions: usize) -> Self {
        Self {
            dir: RegionDirectory::new(num_regions),
            slots: Mutex::new(BTreeMap::new()),
            unparsable: Mutex::new(Vec::new()),
        }
    }

    /// Record a pointer slot: `*slot = value`.
    pub fn put_slot(&self, slot: usize, value: usize) {
        self.slots.lock().insert(slot, value);
    }

    /// Remove a pointer slot.
    pub fn remove_slot(&self, slot: usize) {
        self.slots.lock().remove(&slot);
    }

    /// Make walks of any range intersecting `range` unparsable.
    pub fn set_unparsable(&self, range: MemRange) {
        self.unparsable.lock().push(range);
    }

    /// Clear all unparsable ranges.
    pub fn clear_unparsable(&self) {
        self.unparsable.lock().clear();
    }
}

impl RegionProvider for TestHeap {
    fn region(&self, idx: RegionIndex) -> Option<RegionInfo> {
        self.dir.region(idx)
    }

    fn num_regions(&self) -> usize {
        self.dir.num_regions()
    }
}

impl ObjectWalker for TestHeap {
    fn walk_range(&self, range: MemRange, sink: &mut dyn FnMut(PointerSlot)) -> WalkOutcome {
        if self
            .unparsable
            .lock()
            .iter()
            .any(|u| !u.intersect(range).is_empty())
        {
            return WalkOutcome::Unparsable;
        }
        for (&slot, &value) in self.slots.lock().range(range.start..range.end) {
            sink(PointerSlot { slot, value });
        }
        WalkOutcome::Complete
    }
}

/// Liveness model: explicit live ranges.
#[derive(Default)]
pub struct TestLiveness {
    live: Mutex<Vec<MemRange>>,
}

impl TestLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_live(&self, range: MemRange) {
        self.live.lock().push(range);
    }
}

impl Liveness for TestLiveness {
    fn for_each_live(&self, range: MemRange, f: &mut dyn FnMut(MemRange)) {
        let mut ranges: Vec<MemRange> = self
            .live
            .lock()
            .iter()
            .map(|r| r.intersect(range))
            .filter(|r| !r.is_empty())
            .collect();
        ranges.sort_by_key(|r| r.start);
        for r in ranges {
            f(r);
        }
    }
}

/// A `RemSet` over a fresh `TestHeap` with the testing config; every
/// region is old with `top` at the region end.
pub fn test_rem_set() -> (RemSet, Arc<TestHeap>, RemSetConfig) {
    let config = RemSetConfig::for_testing();
    test_rem_set_with(config)
}

pub fn test_rem_set_with(config: RemSetConfig) -> (RemSet, Arc<TestHeap>, RemSetConfig) {
    let heap = Arc::new(TestHeap::new(config.num_regions()));
    for r in 0..config.num_regions() {
        heap.dir.set_kind(r, RegionKind::Old);
        heap.dir
            .set_top(r, config.heap_base + (r + 1) * config.region_size);
    }
    let rs = RemSet::new(
        config.clone(),
        Arc::clone(&heap) as Arc<dyn RegionProvider>,
        Arc::clone(&heap) as Arc<dyn ObjectWalker>,
    )
    .unwrap();
    (rs, heap, config)
}

/// Address helpers against the testing geometry.
pub fn region_base(config: &RemSetConfig, region: usize) -> usize {
    config.heap_base + region * config.region_size
}

/// A tiny deterministic xorshift for randomized interleavings.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}
