//! Parallel chunked card scanning.
//!
//! Workers walk the increment's dirty-region list in a shared order,
//! racing on each region's chunk-claim cursor; every chunk goes to
//! exactly one worker. Within a claimed chunk the scanner locates maximal
//! runs of dirty cards word-at-a-time, marks the run `SCANNED` *before*
//! walking it (so a re-dirtying mutator write after the pause cannot be
//! conflated with this pass, and no card is delivered twice within it),
//! converts the run to an address range clamped to the region's snapshot
//! top, and hands the range to the caller's walker, which reports every
//! pointer slot to the evacuation closure.
//!
//! A claimed chunk is always fully drained by its claiming worker —
//! partial-chunk failure is not a supported state.

use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use strata_core::MemRange;

use crate::card_table::CardTable;
use crate::hot_card::CardCounts;
use crate::region::RegionIndex;
use crate::scan::scan_state::ScanState;
use crate::stats::RemSetStats;
use crate::walker::{ObjectWalker, PointerSlot, WalkOutcome};

/// The parallel scan task for one evacuation increment.
///
/// Constructed by [`crate::RemSet::scan_task`] after the merge barrier;
/// each gang worker calls [`work`](ScanTask::work) exactly once with its
/// own evacuation closure.
pub struct ScanTask<'a> {
    card_table: &'a CardTable,
    scan_state: &'a ScanState,
    walker: &'a dyn ObjectWalker,
    stats: &'a RemSetStats,
    /// Snapshot of the increment's dirty regions, identical for every
    /// worker so chunk claims interleave within each region.
    regions: Vec<RegionIndex>,
    soft_timeout: Duration,
}

impl<'a> ScanTask<'a> {
    pub(crate) fn new(
        card_table: &'a CardTable,
        scan_state: &'a ScanState,
        walker: &'a dyn ObjectWalker,
        stats: &'a RemSetStats,
        soft_timeout: Duration,
    ) -> Self {
        Self {
            card_table,
            scan_state,
            walker,
            stats,
            regions: scan_state.next_dirty_regions().to_vec(),
            soft_timeout,
        }
    }

    /// Gang-worker entry point.
    ///
    /// `visitor` is this worker's pointer-processing closure; every live,
    /// in-range pointer found is delivered to it at least once.
    pub fn work(
        &self,
        worker_id: usize,
        _num_workers: usize,
        visitor: &mut dyn FnMut(PointerSlot),
    ) {
        let started = Instant::now();

        for &region in &self.regions {
            let top = self.scan_state.scan_top(region);
            if top == 0 {
                // The region left the scannable set after merge flagged it
                // (e.g. freed by an eager reclaim); nothing to scan.
                continue;
            }
            // Object walks may run past a range's card boundary; this
            // worker skips prefixes it has already walked in this region.
            let mut scanned_to = 0usize;

            while let Some(chunk) = self.scan_state.claim_chunk(region) {
                RemSetStats::bump(&self.stats.chunks_claimed);
                if !self.scan_state.chunk_flagged(region, chunk) {
                    RemSetStats::bump(&self.stats.chunks_skipped);
                    continue;
                }
                self.scan_state.clear_chunk_flag(region, chunk);
                self.scan_chunk(region, chunk, top, &mut scanned_to, visitor);
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.soft_timeout {
            // Diagnostics only: committed scan work is never aborted.
            log::warn!(
                "scan worker {worker_id} exceeded soft pause budget: {:?} > {:?}",
                elapsed,
                self.soft_timeout
            );
        }
    }

    /// Drain one claimed chunk completely.
    fn scan_chunk(
        &self,
        region: RegionIndex,
        chunk: usize,
        top: usize,
        scanned_to: &mut usize,
        visitor: &mut dyn FnMut(PointerSlot),
    ) {
        let (region_first, region_last) = self.card_table.card_range_of_region(region);
        let chunk_first = region_first + chunk * self.scan_state.cards_per_chunk();
        let chunk_last = (chunk_first + self.scan_state.cards_per_chunk()).min(region_last);
        assert!(chunk_first < region_last, "claimed chunk out of range");

        let mut cursor = chunk_first;
        while let Some(run_start) = self.card_table.find_next_dirty(cursor, chunk_last) {
            let run_end = self.card_table.dirty_run_end(run_start, chunk_last);

            // Claim the run for this pass before reading any of it.
            self.card_table.mark_range_scanned(run_start, run_end);
            fence(Ordering::SeqCst);

            let mut range = MemRange::new(
                self.card_table.addr_of_card(run_start),
                self.card_table.addr_of_card(run_start)
                    + (run_end - run_start) * self.card_table.card_size(),
            )
            .clamp_end(top);
            if range.start < *scanned_to {
                range.start = (*scanned_to).min(range.end);
            }

            if !range.is_empty() {
                let outcome = self.walker.walk_range(range, visitor);
                // Mutators are paused; an unparsable range here means the
                // snapshot tops are wrong — not a recoverable race.
                assert!(
                    outcome == WalkOutcome::Complete,
                    "heap unparsable during pause scan at {:#x}",
                    range.start
                );
                *scanned_to = range.end;
                RemSetStats::add(&self.stats.cards_scanned, (run_end - run_start) as u64);
            }

            cursor = run_end;
        }
    }
}

/// The parallel card-table cleanup task.
///
/// Clears card state and refinement counts for the regions touched this
/// cycle — the accumulated dirty regions plus the collection-set regions
/// scheduled for clearing — one chunk per claim, never a full-heap sweep.
pub struct CleanupTask<'a> {
    card_table: &'a CardTable,
    counts: &'a CardCounts,
    scan_state: &'a ScanState,
    regions: Vec<RegionIndex>,
    cursor: AtomicUsize,
}

impl<'a> CleanupTask<'a> {
    pub(crate) fn new(
        card_table: &'a CardTable,
        counts: &'a CardCounts,
        scan_state: &'a ScanState,
    ) -> Self {
        let mut regions = scan_state.all_dirty_regions().to_vec();
        for r in scan_state.clear_regions().to_vec() {
            if !regions.contains(&r) {
                regions.push(r);
            }
        }
        Self {
            card_table,
            counts,
            scan_state,
            regions,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Gang-worker entry point. Claims (region, chunk) units until done.
    pub fn work(&self, _worker_id: usize, _num_workers: usize) {
        let chunks_per_region = self.scan_state.chunks_per_region();
        let total = self.regions.len() * chunks_per_region;
        loop {
            let unit = self.cursor.fetch_add(1, Ordering::AcqRel);
            if unit >= total {
                break;
            }
            let region = self.regions[unit / chunks_per_region];
            let chunk = unit % chunks_per_region;

            let (region_first, _) = self.card_table.card_range_of_region(region);
            let first = region_first + chunk * self.scan_state.cards_per_chunk();
            let last = first + self.scan_state.cards_per_chunk();
            self.card_table.clear_card_range(first, last);
            self.counts.clear_range(first, last);
            self.scan_state.clear_chunk_flag(region, chunk);
        }
    }

    /// Regions this cleanup covers (diagnostics and tests).
    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }
}
