//! Pause-time merge of all pointer-tracking sources onto the card table.
//!
//! At the start of each evacuation increment, three sources are unioned
//! onto the card table and into the scan-chunk structures, in parallel
//! across the embedder's workers:
//!
//! 1. the remembered sets of regions in the current increment (their
//!    recorded cards live in *source* regions outside the collection set);
//! 2. the hot-card cache, flushed once per increment;
//! 3. leftover dirty-card log buffers that refinement never drained.
//!
//! Humongous eager-reclaim candidates are pushed as the first jobs so
//! their flushes overlap with the rest of the parallel work. Work is
//! distributed through a crossbeam injector; workers steal jobs until the
//! queue runs dry. The embedder's work gang provides the barrier: every
//! worker must return from [`MergeTask::work`] before scanning starts, so
//! the scanner never observes a partially merged table.

use std::sync::atomic::AtomicU64;

use crossbeam_deque::{Injector, Steal};

use crate::card_table::CardTable;
use crate::hot_card::HotCardCache;
use crate::queue::DirtyCardQueueSet;
use crate::region::RegionIndex;
use crate::rset::RegionRemSets;
use crate::scan::scan_state::ScanState;
use crate::stats::RemSetStats;

/// One unit of merge work.
enum MergeJob {
    /// Flush a humongous eager-reclaim candidate's remembered set.
    FlushReclaimCandidate(RegionIndex),
    /// Merge one evacuated region's remembered set.
    RemSet(RegionIndex),
    /// Drain the hot-card cache.
    HotCache,
    /// Drain leftover completed log buffers (one job per worker; each
    /// loops claiming buffers, so the drain parallelizes naturally).
    LogBuffers,
}

/// The parallel merge task for one evacuation increment.
///
/// Constructed by [`crate::RemSet::merge_task`]; each gang worker calls
/// [`work`](MergeTask::work) exactly once.
pub struct MergeTask<'a> {
    card_table: &'a CardTable,
    rsets: &'a RegionRemSets,
    hot: &'a HotCardCache,
    queue_set: &'a DirtyCardQueueSet,
    scan_state: &'a ScanState,
    stats: &'a RemSetStats,
    jobs: Injector<MergeJob>,
}

impl<'a> MergeTask<'a> {
    pub(crate) fn new(
        card_table: &'a CardTable,
        rsets: &'a RegionRemSets,
        hot: &'a HotCardCache,
        queue_set: &'a DirtyCardQueueSet,
        scan_state: &'a ScanState,
        stats: &'a RemSetStats,
        increment: &[RegionIndex],
        reclaim_candidates: &[RegionIndex],
        num_workers: usize,
    ) -> Self {
        let jobs = Injector::new();

        // Reclaim candidates first: their flushes start while other
        // workers are still picking up the remaining jobs.
        for &r in reclaim_candidates {
            jobs.push(MergeJob::FlushReclaimCandidate(r));
        }
        for &r in increment {
            jobs.push(MergeJob::RemSet(r));
            // The evacuated region itself is not scanned for its own
            // incoming cards, but its card range must still be cleared.
            scan_state.schedule_for_clear(r);
        }
        jobs.push(MergeJob::HotCache);
        for _ in 0..num_workers.max(1) {
            jobs.push(MergeJob::LogBuffers);
        }

        Self {
            card_table,
            rsets,
            hot,
            queue_set,
            scan_state,
            stats,
            jobs,
        }
    }

    /// Gang-worker entry point. Steals and runs jobs until none remain.
    pub fn work(&self, _worker_id: usize, _num_workers: usize) {
        loop {
            match self.jobs.steal() {
                Steal::Success(job) => self.run(job),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
    }

    fn run(&self, job: MergeJob) {
        match job {
            MergeJob::FlushReclaimCandidate(r) | MergeJob::RemSet(r) => self.merge_region_rset(r),
            MergeJob::HotCache => self.merge_hot_cache(),
            MergeJob::LogBuffers => self.merge_log_buffers(),
        }
    }

    /// Walk every representation of region `r`'s remembered set and union
    /// the recorded cards onto the table.
    fn merge_region_rset(&self, r: RegionIndex) {
        let rset = self.rsets.get(r);
        rset.for_each_sparse_card(|src, off| self.merge_card(src, off, &self.stats.merged_sparse));
        rset.for_each_fine_card(|src, off| self.merge_card(src, off, &self.stats.merged_fine));
        rset.for_each_coarse_region(|src| {
            // A coarse entry means any card of `src` may point into `r`:
            // every card of the source below its snapshot top is merged.
            let top = self.scan_state.scan_top(src);
            if top == 0 {
                return;
            }
            let cards_per_region = self.card_table.cards_per_region();
            for off in 0..cards_per_region {
                let card = self.card_table.card_of_region_offset(src, off);
                if self.card_table.addr_of_card(card) >= top {
                    break;
                }
                self.merge_card(src, off, &self.stats.merged_coarse);
            }
        });
    }

    /// Apply one recorded card: check source eligibility against the
    /// snapshot, upgrade the table entry, flag the chunk.
    fn merge_card(&self, src: RegionIndex, card_offset: usize, counter: &AtomicU64) {
        let top = self.scan_state.scan_top(src);
        if top == 0 {
            // Source is in the collection set, young, or gone: its cards
            // are either evacuated wholesale or stale.
            return;
        }
        let card = self.card_table.card_of_region_offset(src, card_offset);
        if self.card_table.addr_of_card(card) >= top {
            // Beyond the snapshot top: the object may not exist yet.
            return;
        }
        self.card_table.mark_clean_as_dirty(card);
        self.scan_state.mark_card_for_scan(src, card_offset);
        RemSetStats::bump(counter);
    }

    /// Flush the hot-card cache onto the table.
    fn merge_hot_cache(&self) {
        self.hot.drain(|card| {
            let src = self.card_table.region_of_card(card);
            let off = self.card_table.card_offset_in_region(card);
            self.merge_card(src, off, &self.stats.merged_hot);
        });
    }

    /// Drain completed log buffers that refinement never got to, applying
    /// refinement's eligibility rules via the snapshot tops.
    fn merge_log_buffers(&self) {
        while let Some(mut node) = self.queue_set.try_claim_completed() {
            for i in 0..node.len() {
                if let Some(card) = node.take_entry(i) {
                    let src = self.card_table.region_of_card(card);
                    let off = self.card_table.card_offset_in_region(card);
                    self.merge_card(src, off, &self.stats.merged_log);
                }
            }
            self.queue_set.release_node(node);
        }
    }
}
