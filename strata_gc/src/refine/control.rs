//! Background refinement threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::card_table::CardTable;
use crate::hot_card::{CardCounts, HotCardCache};
use crate::queue::{DirtyCardQueueSet, SharedDirtyCardQueue};
use crate::refine::{refine_buffer, RefineContext};
use crate::region::RegionProvider;
use crate::rem_set::RemSet;
use crate::rset::RegionRemSets;
use crate::stats::RemSetStats;
use crate::walker::ObjectWalker;

/// Everything a refinement thread needs, clonable into each worker.
struct RefineShared {
    card_table: Arc<CardTable>,
    regions: Arc<dyn RegionProvider>,
    walker: Arc<dyn ObjectWalker>,
    rsets: Arc<RegionRemSets>,
    counts: Arc<CardCounts>,
    hot: Arc<HotCardCache>,
    queue_set: Arc<DirtyCardQueueSet>,
    shared_queue: Arc<SharedDirtyCardQueue>,
    stats: Arc<RemSetStats>,
    stopping: AtomicBool,
}

impl RefineShared {
    fn ctx(&self) -> RefineContext<'_> {
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
}

/// A bounded pool of background refinement threads.
///
/// Each thread repeatedly claims a completed buffer and refines it,
/// parking on the queue set's monitor when no work is available. The pool
/// owns its threads (unlike the pause tasks, which run on the embedder's
/// work gang) and joins them on [`stop`](ConcurrentRefinement::stop) or
/// drop.
pub struct ConcurrentRefinement {
    shared: Arc<RefineShared>,
    handles: Vec<JoinHandle<()>>,
}

impl ConcurrentRefinement {
    /// Spawn `threads` refinement workers against `rem_set`'s components.
    pub fn start(rem_set: &RemSet, threads: usize) -> Self {
        assert!(threads > 0, "refinement pool needs at least one thread");
        let shared = Arc::new(RefineShared {
            card_table: Arc::clone(rem_set.card_table_arc()),
            regions: Arc::clone(rem_set.regions_arc()),
            walker: Arc::clone(rem_set.walker_arc()),
            rsets: Arc::clone(rem_set.rsets_arc()),
            counts: Arc::clone(rem_set.counts_arc()),
            hot: Arc::clone(rem_set.hot_arc()),
            queue_set: Arc::clone(rem_set.queue_set_arc()),
            shared_queue: Arc::clone(rem_set.shared_queue_arc()),
            stats: Arc::clone(rem_set.stats_arc()),
            stopping: AtomicBool::new(false),
        });

        let handles = (0..threads)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("strata-refine-{id}"))
                    .spawn(move || refine_loop(&shared))
                    .expect("failed to spawn refinement thread")
            })
            .collect();

        Self { shared, handles }
    }

    /// Stop and join every refinement thread. Completed buffers still
    /// queued are left for the next pause's merge — never dropped.
    pub fn stop(&mut self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.queue_set.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Number of live worker threads.
    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for ConcurrentRefinement {
    fn drop(&mut self) {
        self.stop();
    }
}

fn refine_loop(shared: &RefineShared) {
    log::debug!("refinement thread started");
    let mut refined = 0u64;
    loop {
        if shared.stopping.load(Ordering::Acquire) {
            break;
        }
        match shared.queue_set.try_claim_completed() {
            Some(node) => {
                refine_buffer(node, &shared.ctx());
                refined += 1;
            }
            None => shared.queue_set.park_until_work(&shared.stopping),
        }
    }
    log::debug!("refinement thread stopping after {refined} buffers");
}
