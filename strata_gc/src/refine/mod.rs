//! Concurrent refinement of dirty-card buffers.
//!
//! Refinement folds raw dirty-card log entries into per-region remembered
//! sets while mutators keep running. The correctness contract: a card may
//! be processed multiple times and may be temporarily deferred, but must
//! never be permanently dropped while still dirty.
//!
//! Per card, the pipeline is:
//!
//! 1. re-check the card is still dirty (another thread may have won);
//! 2. re-check the owning region is still eligible — present, old or
//!    humongous or archive, not in the collection set. A freed, young, or
//!    reallocated region makes the card *stale*: dropped silently, an
//!    expected race outcome, not an error;
//! 3. bump the card's refinement count; hot cards are parked in the
//!    hot-card cache instead of being refined again (whatever the cache
//!    evicts is refined in their place);
//! 4. clean the card, fence, then walk only the live portion of the
//!    card's range. The clean-before-walk order means a racing mutator
//!    store re-dirties and re-enqueues the card rather than being lost;
//! 5. record every cross-region pointer into the *target* region's
//!    remembered set, keyed by this card's source region;
//! 6. an [`WalkOutcome::Unparsable`] walk (racing humongous allocation)
//!    re-dirties the card and re-enqueues it on the shared queue. This is
//!    deliberately distinct from the stale case: collapsing them would
//!    either lose liveness information or re-queue forever.

mod control;


pub use control::ConcurrentRefinement;

use std::sync::atomic::{fence, Ordering};

use crate::card_table::{CardIndex, CardTable};
use crate::hot_card::{CardCounts, HotCardCache};
use crate::queue::{BufferNode, DirtyCardQueueSet, SharedDirtyCardQueue};
use crate::region::{RegionInfo, RegionProvider};
use crate::rset::RegionRemSets;
use crate::stats::RemSetStats;
use crate::walker::{ObjectWalker, WalkOutcome};

/// What happened to one refined card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    /// The card's live range was walked and recorded.
    Refined,
    /// The card was stale (freed/young/reallocated region, or no longer
    /// dirty) and was dropped.
    StaleDropped,
    /// The card's range was unparsable; it was re-dirtied and re-queued.
    Requeued,
    /// The card was hot and parked in the hot-card cache.
    HotParked,
}

/// Borrowed view of everything refinement needs.
pub struct RefineContext<'a> {
    /// The card table.
    pub card_table: &'a CardTable,
    /// Region metadata, queried per card.
    pub regions: &'a dyn RegionProvider,
    /// Object-layout walker from the embedding heap.
    pub walker: &'a dyn ObjectWalker,
    /// Every region's remembered set.
    pub rsets: &'a RegionRemSets,
    /// Per-card refinement counts.
    pub counts: &'a CardCounts,
    /// Hot-card cache.
    pub hot: &'a HotCardCache,
    /// The global queue set (node recycling, re-enqueue).
    pub queue_set: &'a DirtyCardQueueSet,
    /// Shared queue for re-enqueued unparsable cards.
    pub shared_queue: &'a SharedDirtyCardQueue,
    /// Diagnostic counters.
    pub stats: &'a RemSetStats,
}

/// Refine one card, with hot-card filtering.
pub fn refine_card(card: CardIndex, ctx: &RefineContext<'_>) -> RefineOutcome {
    let Some(info) = eligible_region(card, ctx) else {
        RemSetStats::bump(&ctx.stats.cards_stale);
        return RefineOutcome::StaleDropped;
    };

    if ctx.counts.bump_and_test(card) {
        RemSetStats::bump(&ctx.stats.cards_hot_parked);
        if let Some(evicted) = ctx.hot.push(card) {
            // The displaced card takes this one's refinement slot. Its
            // eligibility is re-checked from scratch; only the hot test is
            // skipped, so a parked pair cannot ping-pong.
            refine_card_skip_hot(evicted, ctx);
        }
        return RefineOutcome::HotParked;
    }

    refine_eligible_card(card, info, ctx)
}

/// Refine one card, bypassing the hot-card filter.
///
/// Used for cards the cache displaces: they already earned their parking,
/// so running them through the filter again would just thrash the cache.
pub fn refine_card_skip_hot(card: CardIndex, ctx: &RefineContext<'_>) -> RefineOutcome {
    match eligible_region(card, ctx) {
        Some(info) => refine_eligible_card(card, info, ctx),
        None => {
            RemSetStats::bump(&ctx.stats.cards_stale);
            RefineOutcome::StaleDropped
        }
    }
}

/// Eligibility re-check: still dirty, region present and scannable and
/// not being evacuated.
fn eligible_region(card: CardIndex, ctx: &RefineContext<'_>) -> Option<RegionInfo> {
    if !ctx.card_table.is_dirty(card) {
        return None;
    }
    let region = ctx.card_table.region_of_card(card);
    let info = ctx.regions.region(region)?;
    (info.kind.is_scannable() && !info.in_collection_set).then_some(info)
}

/// Clean, fence, walk, record.
fn refine_eligible_card(
    card: CardIndex,
    info: RegionInfo,
    ctx: &RefineContext<'_>,
) -> RefineOutcome {
    let region = ctx.card_table.region_of_card(card);

    // Clean before walking: a mutator store racing this walk re-dirties
    // the card and re-enqueues it, so nothing written during the walk can
    // be lost. The fence orders the clean before every read of the range.
    ctx.card_table.mark_clean(card);
    fence(Ordering::SeqCst);

    let range = ctx.card_table.range_of_card(card).clamp_end(info.top);
    if range.is_empty() {
        // The card maps beyond the region's live portion; nothing to walk.
        RemSetStats::bump(&ctx.stats.cards_refined);
        return RefineOutcome::Refined;
    }

    let card_offset = ctx.card_table.card_offset_in_region(card);
    let outcome = ctx.walker.walk_range(range, &mut |slot| {
        if let Some(target) = ctx.card_table.region_of_addr(slot.value) {
            if target != region && ctx.regions.region(target).is_some() {
                ctx.rsets.get(target).add_card(region, card_offset);
            }
        }
    });

    match outcome {
        WalkOutcome::Complete => {
            RemSetStats::bump(&ctx.stats.cards_refined);
            RefineOutcome::Refined
        }
        WalkOutcome::Unparsable => {
            // Leave nothing behind: restore the dirty state and hand the
            // card to the shared queue for a later retry.
            ctx.card_table.mark_dirty(ctx.card_table.addr_of_card(card));
            ctx.shared_queue.enqueue(card, ctx.queue_set);
            RemSetStats::bump(&ctx.stats.cards_requeued);
            RefineOutcome::Requeued
        }
    }
}

/// Drain one claimed buffer, nulling entries as they are processed, then
/// recycle the node.
pub fn refine_buffer(mut node: BufferNode, ctx: &RefineContext<'_>) {
    for i in 0..node.len() {
        if let Some(card) = node.take_entry(i) {
            refine_card(card, ctx);
        }
    }
    ctx.queue_set.release_node(node);
    RemSetStats::bump(&ctx.stats.buffers_refined);
}

/// Synchronous refinement of one completed buffer by a mutator thread.
///
/// The backpressure fallback: called when `enqueue` reports
/// [`crate::queue::EnqueueOutcome::MustRefine`]. Returns `false` if the
/// completed list was already empty (another thread got there first).
pub fn mutator_assist(ctx: &RefineContext<'_>) -> bool {
    match ctx.queue_set.try_claim_completed() {
        Some(node) => {
            log::trace!("mutator refining one buffer under backpressure");
            refine_buffer(node, ctx);
            RemSetStats::bump(&ctx.stats.mutator_refinements);
            true
        }
        None => false,
    }
}
