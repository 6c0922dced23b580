//! The remembered-set subsystem facade.
//!
//! [`RemSet`] wires the card table, dirty-card queues, hot-card
//! machinery, per-region remembered sets, and scan state together, and
//! hands out the pause-time tasks the embedder's work gang runs. It never
//! creates pause worker threads itself; only the background refinement
//! pool ([`crate::ConcurrentRefinement`]) owns threads.
//!
//! # Pause driver contract
//!
//! For each evacuation increment the embedder, with mutators paused:
//!
//! 1. quiesces concurrent refinement (stop the pool, or otherwise ensure
//!    no refinement thread is mid-card), flushes every mutator's
//!    [`crate::DirtyCardQueue`], and calls [`RemSet::flush_shared_queue`];
//! 2. calls [`RemSet::prepare_increment`] (snapshot allocation tops);
//! 3. runs [`RemSet::merge_task`] on the gang, with a barrier after;
//! 4. runs [`RemSet::scan_task`] on the gang, with a barrier after;
//! 5. after the last increment, runs [`RemSet::cleanup_task`] and then
//!    calls [`RemSet::finish_cycle`].
//!
//! The barriers guarantee scan never observes a partially merged table.

use std::sync::Arc;
use std::time::Duration;

use strata_core::{GcError, GcResult};

use crate::card_table::CardTable;
use crate::config::RemSetConfig;
use crate::hot_card::{CardCounts, HotCardCache};
use crate::queue::{DirtyCardQueueSet, SharedDirtyCardQueue};
use crate::rebuild::RebuildTask;
use crate::refine::RefineContext;
use crate::region::{RegionIndex, RegionProvider};
use crate::rset::RegionRemSets;
use crate::scan::{CleanupTask, MergeTask, ScanState, ScanTask};
use crate::stats::{RemSetStats, RemSetStatsSnapshot};
use crate::walker::{Liveness, ObjectWalker};

/// The concurrent card-table remembered-set subsystem.
pub struct RemSet {
    config: RemSetConfig,
    card_table: Arc<CardTable>,
    queue_set: Arc<DirtyCardQueueSet>,
    shared_queue: Arc<SharedDirtyCardQueue>,
    counts: Arc<CardCounts>,
    hot: Arc<HotCardCache>,
    rsets: Arc<RegionRemSets>,
    scan_state: Arc<ScanState>,
    stats: Arc<RemSetStats>,
    regions: Arc<dyn RegionProvider>,
    walker: Arc<dyn ObjectWalker>,
}

impl RemSet {
    /// Create the subsystem for the given geometry and collaborators.
    pub fn new(
        config: RemSetConfig,
        regions: Arc<dyn RegionProvider>,
        walker: Arc<dyn ObjectWalker>,
    ) -> GcResult<Self> {
        config.validate().map_err(|e| GcError::InvalidConfig {
            reason: e.to_string(),
        })?;

        let stats = Arc::new(RemSetStats::new());
        let card_table = Arc::new(CardTable::new(
            config.heap_base,
            config.heap_size,
            config.card_size,
            config.region_size,
        ));
        let queue_set = Arc::new(DirtyCardQueueSet::new(&config, Arc::clone(&stats)));
        let counts = Arc::new(CardCounts::new(
            card_table.num_cards(),
            config.hot_card_threshold,
        ));
        let hot = Arc::new(HotCardCache::new(config.hot_card_cache_size));
        let rsets = Arc::new(RegionRemSets::new(
            config.num_regions(),
            config.cards_per_region(),
            config.sparse_table_cap,
            config.fine_tables_cap,
        ));
        let scan_state = Arc::new(ScanState::new(
            config.num_regions(),
            config.chunks_per_region(),
            config.cards_per_chunk,
        ));

        Ok(Self {
            config,
            card_table,
            queue_set,
            shared_queue: Arc::new(SharedDirtyCardQueue::new()),
            counts,
            hot,
            rsets,
            scan_state,
            stats,
            regions,
            walker,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration.
    #[inline]
    pub fn config(&self) -> &RemSetConfig {
        &self.config
    }

    /// The card table.
    #[inline]
    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    /// The global dirty-card queue set.
    #[inline]
    pub fn queue_set(&self) -> &DirtyCardQueueSet {
        &self.queue_set
    }

    /// Every region's remembered set.
    #[inline]
    pub fn rsets(&self) -> &RegionRemSets {
        &self.rsets
    }

    /// The scan state (tests and diagnostics).
    #[inline]
    pub fn scan_state(&self) -> &ScanState {
        &self.scan_state
    }

    /// Snapshot the diagnostic counters.
    pub fn stats(&self) -> RemSetStatsSnapshot {
        self.stats.snapshot()
    }

    /// A borrowed refinement context over this subsystem's components.
    pub fn refine_context(&self) -> RefineContext<'_> {
        RefineContext {
            card_table: &self.card_table,
            regions: self.regions.as_ref(),
            walker: self.walker.as_ref(),
            rsets: &self.rsets,
            counts: &self.counts,
            hot: &self.hot,
            queue_set: &self.queue_set,
            shared_queue: &self.shared_queue,
            stats: &self.stats,
        }
    }

    // =========================================================================
    // Pause-Time Entry Points
    // =========================================================================

    /// Flush the ownerless shared queue (pause start).
    pub fn flush_shared_queue(&self) {
        self.shared_queue.flush(&self.queue_set);
    }

    /// Snapshot allocation tops and reset per-increment scan state.
    pub fn prepare_increment(&self) {
        self.scan_state.prepare_increment(self.regions.as_ref());
    }

    /// Build the merge task for this increment.
    ///
    /// `increment` lists the collection-set regions being evacuated now;
    /// `reclaim_candidates` lists humongous eager-reclaim candidates whose
    /// remembered sets are flushed ahead of the rest of the work.
    pub fn merge_task(
        &self,
        increment: &[RegionIndex],
        reclaim_candidates: &[RegionIndex],
        num_workers: usize,
    ) -> MergeTask<'_> {
        MergeTask::new(
            &self.card_table,
            &self.rsets,
            &self.hot,
            &self.queue_set,
            &self.scan_state,
            &self.stats,
            increment,
            reclaim_candidates,
            num_workers,
        )
    }

    /// Build the scan task. Call only after every merge worker finished.
    pub fn scan_task(&self) -> ScanTask<'_> {
        ScanTask::new(
            &self.card_table,
            &self.scan_state,
            self.walker.as_ref(),
            &self.stats,
            Duration::from_millis(self.config.pause_soft_timeout_ms),
        )
    }

    /// Build the cleanup task over every region touched this cycle.
    pub fn cleanup_task(&self) -> CleanupTask<'_> {
        CleanupTask::new(&self.card_table, &self.counts, &self.scan_state)
    }

    /// Forget cycle state after the cleanup barrier.
    pub fn finish_cycle(&self) {
        self.scan_state.finish_cycle();
    }

    /// Build a rebuild task for one region.
    ///
    /// `liveness` reports marked-live ranges below `top_at_mark_start`;
    /// everything up to `top_at_rebuild_start` beyond it is walked
    /// unconditionally.
    pub fn rebuild_task<'a>(
        &'a self,
        region: RegionIndex,
        top_at_mark_start: usize,
        top_at_rebuild_start: usize,
        liveness: &'a dyn Liveness,
    ) -> RebuildTask<'a> {
        RebuildTask::new(
            &self.card_table,
            self.regions.as_ref(),
            self.walker.as_ref(),
            &self.rsets,
            liveness,
            region,
            top_at_mark_start,
            top_at_rebuild_start,
            self.config.rebuild_chunk_bytes,
        )
    }

    // =========================================================================
    // Component Handles (refinement pool wiring)
    // =========================================================================

    pub(crate) fn card_table_arc(&self) -> &Arc<CardTable> {
        &self.card_table
    }
    pub(crate) fn regions_arc(&self) -> &Arc<dyn RegionProvider> {
        &self.regions
    }
    pub(crate) fn walker_arc(&self) -> &Arc<dyn ObjectWalker> {
        &self.walker
    }
    pub(crate) fn rsets_arc(&self) -> &Arc<RegionRemSets> {
        &self.rsets
    }
    pub(crate) fn counts_arc(&self) -> &Arc<CardCounts> {
        &self.counts
    }
    pub(crate) fn hot_arc(&self) -> &Arc<HotCardCache> {
        &self.hot
    }
    pub(crate) fn queue_set_arc(&self) -> &Arc<DirtyCardQueueSet> {
        &self.queue_set
    }
    pub(crate) fn shared_queue_arc(&self) -> &Arc<SharedDirtyCardQueue> {
        &self.shared_queue
    }
    pub(crate) fn stats_arc(&self) -> &Arc<RemSetStats> {
        &self.stats
    }
}
