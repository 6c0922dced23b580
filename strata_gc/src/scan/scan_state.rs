//! Pause-time scan bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::region::{RegionIndex, RegionProvider};

/// A deduplicating, concurrently appendable set of region indices.
///
/// Membership is claimed with a per-region atomic flag; the winning
/// thread appends to the list under a small mutex. The flag CAS is the
/// dedup — the lock only orders the pushes.
pub struct DirtyRegionList {
    present: Box<[AtomicBool]>,
    list: Mutex<Vec<RegionIndex>>,
}

impl DirtyRegionList {
    /// Create an empty list over `num_regions` regions.
    pub fn new(num_regions: usize) -> Self {
        Self {
            present: (0..num_regions).map(|_| AtomicBool::new(false)).collect(),
            list: Mutex::new(Vec::new()),
        }
    }

    /// Add a region; returns `true` if it was newly added.
    pub fn add(&self, region: RegionIndex) -> bool {
        if self.present[region]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.list.lock().push(region);
            true
        } else {
            false
        }
    }

    /// Check membership.
    pub fn contains(&self, region: RegionIndex) -> bool {
        self.present[region].load(Ordering::Acquire)
    }

    /// Snapshot the current members.
    pub fn to_vec(&self) -> Vec<RegionIndex> {
        self.list.lock().clone()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    /// Check whether no regions are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every member.
    pub fn reset(&self) {
        let mut list = self.list.lock();
        for &r in list.iter() {
            self.present[r].store(false, Ordering::Release);
        }
        list.clear();
    }
}

/// Scan-time state shared by the merge, scan, and cleanup tasks.
///
/// Holds, per region: the allocation-top snapshot taken at merge start,
/// one flag per scan chunk, and the chunk-claim cursor workers race on.
/// Region sets are tracked at two scopes: `next_dirty_regions` is the
/// current increment's scan list; `all_dirty_regions` accumulates across
/// increments (the cleanup scope) — evacuation proceeds in increments, so
/// the accumulated set must grow, never be replaced.
pub struct ScanState {
    /// Per-region allocation-top snapshot; 0 means "do not scan".
    scan_top: Box<[AtomicUsize]>,
    /// One flag per (region, chunk): does the chunk hold cards to scan?
    chunk_flags: Box<[AtomicBool]>,
    /// Per-region chunk-claim cursors.
    chunk_claims: Box<[AtomicUsize]>,
    /// Regions to scan in the current increment.
    next_dirty_regions: DirtyRegionList,
    /// Regions touched in any increment of the cycle (cleanup scope).
    all_dirty_regions: DirtyRegionList,
    /// Collection-set regions whose card ranges must be cleared even
    /// though they are not scanned through this path.
    clear_regions: DirtyRegionList,
    chunks_per_region: usize,
    cards_per_chunk: usize,
}

impl ScanState {
    /// Create scan state for the given geometry.
    pub fn new(num_regions: usize, chunks_per_region: usize, cards_per_chunk: usize) -> Self {
        Self {
            scan_top: (0..num_regions).map(|_| AtomicUsize::new(0)).collect(),
            chunk_flags: (0..num_regions * chunks_per_region)
                .map(|_| AtomicBool::new(false))
                .collect(),
            chunk_claims: (0..num_regions).map(|_| AtomicUsize::new(0)).collect(),
            next_dirty_regions: DirtyRegionList::new(num_regions),
            all_dirty_regions: DirtyRegionList::new(num_regions),
            clear_regions: DirtyRegionList::new(num_regions),
            chunks_per_region,
            cards_per_chunk,
        }
    }

    /// Snapshot every region's allocation top and reset per-increment
    /// state. Collection-set, young, and absent regions get a zero top:
    /// their cards are never scanned through this path.
    ///
    /// Must run before the merge task of each increment, with mutators
    /// paused.
    pub fn prepare_increment(&self, provider: &dyn RegionProvider) {
        for r in 0..self.scan_top.len() {
            let top = match provider.region(r) {
                Some(info) if info.kind.is_scannable() && !info.in_collection_set => info.top,
                _ => 0,
            };
            self.scan_top[r].store(top, Ordering::Release);
            self.chunk_claims[r].store(0, Ordering::Release);
        }
        self.next_dirty_regions.reset();
    }

    /// The allocation-top snapshot for `region` (0 = do not scan).
    #[inline]
    pub fn scan_top(&self, region: RegionIndex) -> usize {
        self.scan_top[region].load(Ordering::Acquire)
    }

    /// Record that `(region, card offset)` holds a card to scan: flag its
    /// chunk and add the region to the increment and cycle sets.
    pub fn mark_card_for_scan(&self, region: RegionIndex, card_offset: usize) {
        let chunk = card_offset / self.cards_per_chunk;
        self.chunk_flag(region, chunk).store(true, Ordering::Release);
        self.next_dirty_regions.add(region);
        self.all_dirty_regions.add(region);
    }

    /// Schedule a collection-set region's card range for clearing.
    pub fn schedule_for_clear(&self, region: RegionIndex) {
        self.clear_regions.add(region);
    }

    /// Claim the next chunk of `region`; `None` once all are claimed.
    ///
    /// The fetch-add hands each chunk index to exactly one worker.
    pub fn claim_chunk(&self, region: RegionIndex) -> Option<usize> {
        let chunk = self.chunk_claims[region].fetch_add(1, Ordering::AcqRel);
        (chunk < self.chunks_per_region).then_some(chunk)
    }

    /// Check a chunk's scan flag.
    pub fn chunk_flagged(&self, region: RegionIndex, chunk: usize) -> bool {
        self.chunk_flag(region, chunk).load(Ordering::Acquire)
    }

    /// Clear a chunk's scan flag (claimed by the scanner, or cleanup).
    pub fn clear_chunk_flag(&self, region: RegionIndex, chunk: usize) {
        self.chunk_flag(region, chunk).store(false, Ordering::Release);
    }

    #[inline]
    fn chunk_flag(&self, region: RegionIndex, chunk: usize) -> &AtomicBool {
        assert!(
            chunk < self.chunks_per_region,
            "chunk index {chunk} out of range for region {region}"
        );
        &self.chunk_flags[region * self.chunks_per_region + chunk]
    }

    /// Regions to scan in the current increment.
    pub fn next_dirty_regions(&self) -> &DirtyRegionList {
        &self.next_dirty_regions
    }

    /// Regions touched anywhere in the cycle.
    pub fn all_dirty_regions(&self) -> &DirtyRegionList {
        &self.all_dirty_regions
    }

    /// Collection-set regions awaiting card clearing.
    pub fn clear_regions(&self) -> &DirtyRegionList {
        &self.clear_regions
    }

    /// Chunks per region.
    pub fn chunks_per_region(&self) -> usize {
        self.chunks_per_region
    }

    /// Cards per chunk.
    pub fn cards_per_chunk(&self) -> usize {
        self.cards_per_chunk
    }

    /// Forget every touched region and snapshot (end of cycle, after the
    /// cleanup task's barrier).
    pub fn finish_cycle(&self) {
        for r in self.all_dirty_regions.to_vec() {
            self.scan_top[r].store(0, Ordering::Release);
            self.chunk_claims[r].store(0, Ordering::Release);
        }
        for r in self.clear_regions.to_vec() {
            self.scan_top[r].store(0, Ordering::Release);
            self.chunk_claims[r].store(0, Ordering::Release);
        }
        self.next_dirty_regions.reset();
        self.all_dirty_regions.reset();
        self.clear_regions.reset();
    }
}
