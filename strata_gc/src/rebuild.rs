//! Remembered-set rebuild after concurrent marking.
//!
//! When tracking for a set of regions was abandoned (e.g. around a full
//! collection), their remembered-set contributions are re-derived from
//! scratch: each rebuilt region is walked as a *source*, and every
//! cross-region pointer found is recorded into the target region's
//! remembered set — the same recording rule refinement applies.
//!
//! The walk is bounded by two watermarks. Below the region's
//! top-at-mark-start only objects the external [`Liveness`] source
//! reports live are walked (dead objects may hold dangling pointers);
//! everything between top-at-mark-start and top-at-rebuild-start was
//! allocated during marking and is unconditionally live.
//!
//! The pass is chunked, and after each chunk it runs an explicit
//! yield/abort check and re-reads the region's current top: an eager
//! humongous reclaim may shrink the target watermark mid-rebuild, and the
//! rebuild must clamp and stop cleanly rather than scan freed memory.

use strata_core::MemRange;

use crate::card_table::CardTable;
use crate::region::{RegionIndex, RegionProvider};
use crate::rset::RegionRemSets;
use crate::walker::{Liveness, ObjectWalker, WalkOutcome};

/// How a rebuild attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Every live object up to the (possibly clamped) target watermark
    /// was walked and recorded.
    Complete,
    /// The pass stopped cooperatively: the abort check fired, the region
    /// was freed underneath the pass, or a range turned unparsable. The
    /// caller reschedules the region if it still needs rebuilding.
    Aborted,
}

/// Rebuild of one region's outgoing remembered-set contributions.
///
/// Constructed by [`crate::RemSet::rebuild_task`]; typically one task per
/// region, distributed across the concurrent-mark work gang.
pub struct RebuildTask<'a> {
    card_table: &'a CardTable,
    regions: &'a dyn RegionProvider,
    walker: &'a dyn ObjectWalker,
    rsets: &'a RegionRemSets,
    liveness: &'a dyn Liveness,
    region: RegionIndex,
    top_at_mark_start: usize,
    top_at_rebuild_start: usize,
    chunk_bytes: usize,
}

impl<'a> RebuildTask<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        card_table: &'a CardTable,
        regions: &'a dyn RegionProvider,
        walker: &'a dyn ObjectWalker,
        rsets: &'a RegionRemSets,
        liveness: &'a dyn Liveness,
        region: RegionIndex,
        top_at_mark_start: usize,
        top_at_rebuild_start: usize,
        chunk_bytes: usize,
    ) -> Self {
        assert!(
            top_at_mark_start <= top_at_rebuild_start,
            "watermarks out of order for region {region}"
        );
        Self {
            card_table,
            regions,
            walker,
            rsets,
            liveness,
            region,
            top_at_mark_start,
            top_at_rebuild_start,
            chunk_bytes,
        }
    }

    /// Run the rebuild. `should_abort` is polled after every chunk.
    pub fn run(&self, should_abort: &dyn Fn() -> bool) -> RebuildOutcome {
        let bottom = self.card_table.region_bottom(self.region);
        let mut cursor = bottom;
        let mut limit = self.top_at_rebuild_start;

        while cursor < limit {
            if should_abort() {
                log::debug!("rebuild of region {} yielded at {cursor:#x}", self.region);
                return RebuildOutcome::Aborted;
            }

            // Re-read the region each chunk: the target watermark shrinks
            // if the region was trimmed or reclaimed mid-rebuild.
            match self.regions.region(self.region) {
                Some(info) if info.kind.is_scannable() => limit = limit.min(info.top),
                _ => return RebuildOutcome::Aborted,
            }
            if cursor >= limit {
                break;
            }

            let chunk = MemRange::new(cursor, (cursor + self.chunk_bytes).min(limit));
            if !self.rebuild_chunk(chunk) {
                return RebuildOutcome::Aborted;
            }
            cursor = chunk.end;
        }

        RebuildOutcome::Complete
    }

    /// Walk one chunk; returns `false` on an unparsable range.
    fn rebuild_chunk(&self, chunk: MemRange) -> bool {
        let tams = self.top_at_mark_start;

        if chunk.start < tams {
            // Below the mark-start watermark: only marked-live ranges.
            let below = chunk.clamp_end(tams);
            let mut parsable = true;
            self.liveness.for_each_live(below, &mut |live| {
                if parsable && self.walk_recording(live) == WalkOutcome::Unparsable {
                    parsable = false;
                }
            });
            if !parsable {
                return false;
            }
        }

        if chunk.end > tams {
            // Between the watermarks: unconditionally live.
            let above = MemRange::new(chunk.start.max(tams), chunk.end);
            if self.walk_recording(above) == WalkOutcome::Unparsable {
                return false;
            }
        }

        true
    }

    /// Walk `range`, recording each cross-region pointer into the target
    /// region's remembered set keyed by this region and the slot's card.
    fn walk_recording(&self, range: MemRange) -> WalkOutcome {
        self.walker.walk_range(range, &mut |slot| {
            let Some(target) = self.card_table.region_of_addr(slot.value) else {
                return;
            };
            if target == self.region || self.regions.region(target).is_none() {
                return;
            }
            if let Some(card) = self.card_table.card_index(slot.slot) {
                let offset = self.card_table.card_offset_in_region(card);
                self.rsets.get(target).add_card(self.region, offset);
            }
        })
    }
}
