//! Remembered-set statistics.
//!
//! Atomic counters owned by the subsystem object, exposed read-only
//! through [`RemSetStats::snapshot`]. Diagnostics only — nothing in the
//! subsystem consults these for correctness decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about remembered-set activity.
#[derive(Debug, Default)]
pub struct RemSetStats {
    // =========================================================================
    // Dirty-Card Queue
    // =========================================================================
    /// Cards enqueued by write barriers.
    pub cards_enqueued: AtomicU64,
    /// Buffers handed to the completed list.
    pub buffers_completed: AtomicU64,
    /// Synchronous refinement passes forced on mutators by backpressure.
    pub mutator_refinements: AtomicU64,

    // =========================================================================
    // Concurrent Refinement
    // =========================================================================
    /// Buffers fully drained by refinement.
    pub buffers_refined: AtomicU64,
    /// Cards folded into remembered sets.
    pub cards_refined: AtomicU64,
    /// Cards dropped as stale (freed/young/reallocated region).
    pub cards_stale: AtomicU64,
    /// Cards re-dirtied and re-queued after an unparsable walk.
    pub cards_requeued: AtomicU64,
    /// Cards parked in the hot-card cache instead of being refined.
    pub cards_hot_parked: AtomicU64,

    // =========================================================================
    // Pause-Time Merge
    // =========================================================================
    /// Cards merged from sparse remembered-set tables.
    pub merged_sparse: AtomicU64,
    /// Cards merged from fine remembered-set bitmaps.
    pub merged_fine: AtomicU64,
    /// Cards merged from coarse whole-region entries.
    pub merged_coarse: AtomicU64,
    /// Cards merged from the hot-card cache.
    pub merged_hot: AtomicU64,
    /// Cards merged from leftover log buffers.
    pub merged_log: AtomicU64,

    // =========================================================================
    // Parallel Scan
    // =========================================================================
    /// Chunks claimed by scan workers.
    pub chunks_claimed: AtomicU64,
    /// Claimed chunks skipped because their flag was clear.
    pub chunks_skipped: AtomicU64,
    /// Cards delivered to the scan closure.
    pub cards_scanned: AtomicU64,
}

impl RemSetStats {
    /// Create new zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a counter by `n`.
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Bump a counter by one.
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a non-atomic snapshot of the current counters.
    pub fn snapshot(&self) -> RemSetStatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RemSetStatsSnapshot {
            cards_enqueued: read(&self.cards_enqueued),
            buffers_completed: read(&self.buffers_completed),
            mutator_refinements: read(&self.mutator_refinements),
            buffers_refined: read(&self.buffers_refined),
            cards_refined: read(&self.cards_refined),
            cards_stale: read(&self.cards_stale),
            cards_requeued: read(&self.cards_requeued),
            cards_hot_parked: read(&self.cards_hot_parked),
            merged_sparse: read(&self.merged_sparse),
            merged_fine: read(&self.merged_fine),
            merged_coarse: read(&self.merged_coarse),
            merged_hot: read(&self.merged_hot),
            merged_log: read(&self.merged_log),
            chunks_claimed: read(&self.chunks_claimed),
            chunks_skipped: read(&self.chunks_skipped),
            cards_scanned: read(&self.cards_scanned),
        }
    }
}

/// Non-atomic snapshot of [`RemSetStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemSetStatsSnapshot {
    /// Cards enqueued by write barriers.
    pub cards_enqueued: u64,
    /// Buffers handed to the completed list.
    pub buffers_completed: u64,
    /// Synchronous refinement passes forced on mutators.
    pub mutator_refinements: u64,
    /// Buffers fully drained by refinement.
    pub buffers_refined: u64,
    /// Cards folded into remembered sets.
    pub cards_refined: u64,
    /// Cards dropped as stale.
    pub cards_stale: u64,
    /// Cards re-dirtied and re-queued.
    pub cards_requeued: u64,
    /// Cards parked in the hot-card cache.
    pub cards_hot_parked: u64,
    /// Cards merged from sparse tables.
    pub merged_sparse: u64,
    /// Cards merged from fine bitmaps.
    pub merged_fine: u64,
    /// Cards merged from coarse entries.
    pub merged_coarse: u64,
    /// Cards merged from the hot-card cache.
    pub merged_hot: u64,
    /// Cards merged from leftover log buffers.
    pub merged_log: u64,
    /// Chunks claimed by scan workers.
    pub chunks_claimed: u64,
    /// Claimed chunks skipped as clean.
    pub chunks_skipped: u64,
    /// Cards delivered to the scan closure.
    pub cards_scanned: u64,
}
