//! Per-region remembered sets.
//!
//! Each region tracks, per *source* region, which of the source's cards
//! may contain pointers into it. The representation is chosen by
//! occupancy and only ever grows within a collection cycle:
//!
//! ```text
//!   (empty) ──► Sparse ──► Fine ──► Coarse
//!              card list   card     "any card of the source
//!              (capped)    bitmap    may point here"
//! ```
//!
//! Promotion never discards recorded entries: sparse offsets migrate into
//! the fine bitmap, and a coarsened source is a strict superset of its
//! fine bitmap. Demotion within a cycle is forbidden — it could lose
//! already-recorded cards. [`RegionRemSet::clear`] resets everything when
//! the region is reclaimed or rebuilt.

mod fine;
mod sparse;


pub use fine::CardBitmap;
pub use sparse::{SparseInsert, SparseTable};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::region::RegionIndex;

/// Result of recording a card in a remembered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The card increased the set's occupancy.
    Added,
    /// The card was already covered (exactly or by a coarse entry).
    Present,
}

/// Occupancy of one region's remembered set, by representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemSetOccupancy {
    /// Card offsets held in sparse tables.
    pub sparse_cards: usize,
    /// Card bits set in fine bitmaps.
    pub fine_cards: usize,
    /// Sources coarsened to whole-region entries.
    pub coarse_regions: usize,
}

impl RemSetOccupancy {
    /// Total recorded cards, counting each coarse source as one.
    pub fn total(&self) -> usize {
        self.sparse_cards + self.fine_cards + self.coarse_regions
    }
}

/// The representations for one target region, keyed by source region.
struct RemSetTable {
    sparse: FxHashMap<RegionIndex, SparseTable>,
    fine: FxHashMap<RegionIndex, CardBitmap>,
    /// One bit per source region: "any card of S may point here".
    coarse: CardBitmap,
}

/// Remembered set for a single target region.
///
/// `add_card` is called concurrently by refinement threads and the
/// rebuild pass; a per-region mutex scopes each insert. The lock is
/// per-region (not global) because refinement threads fan out across
/// many target regions at once.
pub struct RegionRemSet {
    inner: Mutex<RemSetTable>,
    cards_per_region: usize,
    sparse_cap: usize,
    fine_cap: usize,
}

impl RegionRemSet {
    /// Create an empty remembered set.
    ///
    /// `num_regions` sizes the coarse source bitmap; `sparse_cap` and
    /// `fine_cap` are the promotion thresholds.
    pub fn new(
        cards_per_region: usize,
        num_regions: usize,
        sparse_cap: usize,
        fine_cap: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(RemSetTable {
                sparse: FxHashMap::default(),
                fine: FxHashMap::default(),
                coarse: CardBitmap::new(num_regions),
            }),
            cards_per_region,
            sparse_cap,
            fine_cap,
        }
    }

    /// Record that card `offset` of region `src` may point into this
    /// region.
    pub fn add_card(&self, src: RegionIndex, offset: usize) -> AddOutcome {
        debug_assert!(
            offset < self.cards_per_region,
            "card offset {offset} out of range"
        );
        let mut table = self.inner.lock();

        if table.coarse.test(src) {
            return AddOutcome::Present;
        }

        if let Some(bitmap) = table.fine.get_mut(&src) {
            return if bitmap.set(offset) {
                AddOutcome::Added
            } else {
                AddOutcome::Present
            };
        }

        let entry = table
            .sparse
            .entry(src)
            .or_insert_with(|| SparseTable::new(self.sparse_cap));
        match entry.insert(offset as u32) {
            SparseInsert::Added => AddOutcome::Added,
            SparseInsert::Present => AddOutcome::Present,
            SparseInsert::Full => {
                self.promote_to_fine(&mut table, src, offset);
                AddOutcome::Added
            }
        }
    }

    /// Promote `src`'s sparse list to a fine bitmap, recording `offset`,
    /// coarsening the fullest fine table if the fine cap is exceeded.
    fn promote_to_fine(&self, table: &mut RemSetTable, src: RegionIndex, offset: usize) {
        let sparse = table.sparse.remove(&src).expect("promoting absent source");
        let mut bitmap = CardBitmap::new(self.cards_per_region);
        for off in sparse.iter() {
            bitmap.set(off as usize);
        }
        bitmap.set(offset);
        table.fine.insert(src, bitmap);

        if table.fine.len() > self.fine_cap {
            // Coarsen the fullest fine table: it loses the least precision
            // relative to the whole-region entry replacing it.
            let victim = table
                .fine
                .iter()
                .max_by_key(|(_, bm)| bm.count())
                .map(|(&r, _)| r)
                .expect("fine tables cannot be empty here");
            table.fine.remove(&victim);
            table.coarse.set(victim);
        }
    }

    /// Check whether `(src, offset)` is covered by any representation.
    pub fn contains(&self, src: RegionIndex, offset: usize) -> bool {
        let table = self.inner.lock();
        if table.coarse.test(src) {
            return true;
        }
        if let Some(bitmap) = table.fine.get(&src) {
            return bitmap.test(offset);
        }
        table
            .sparse
            .get(&src)
            .is_some_and(|s| s.contains(offset as u32))
    }

    /// Current occupancy by representation.
    pub fn occupancy(&self) -> RemSetOccupancy {
        let table = self.inner.lock();
        RemSetOccupancy {
            sparse_cards: table.sparse.values().map(SparseTable::len).sum(),
            fine_cards: table.fine.values().map(CardBitmap::count).sum(),
            coarse_regions: table.coarse.count(),
        }
    }

    /// Check whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        let table = self.inner.lock();
        table.sparse.is_empty() && table.fine.is_empty() && table.coarse.is_empty()
    }

    /// Invoke `f` for every sparse-recorded `(source, card offset)`.
    pub fn for_each_sparse_card(&self, mut f: impl FnMut(RegionIndex, usize)) {
        let table = self.inner.lock();
        for (&src, sparse) in &table.sparse {
            for off in sparse.iter() {
                f(src, off as usize);
            }
        }
    }

    /// Invoke `f` for every fine-recorded `(source, card offset)`.
    pub fn for_each_fine_card(&self, mut f: impl FnMut(RegionIndex, usize)) {
        let table = self.inner.lock();
        for (&src, bitmap) in &table.fine {
            bitmap.for_each_set(|off| f(src, off));
        }
    }

    /// Invoke `f` for every coarsened source region.
    pub fn for_each_coarse_region(&self, mut f: impl FnMut(RegionIndex)) {
        let table = self.inner.lock();
        table.coarse.for_each_set(&mut f);
    }

    /// Drop every recorded entry (region reclaimed or about to be rebuilt).
    pub fn clear(&self) {
        let mut table = self.inner.lock();
        table.sparse.clear();
        table.fine.clear();
        table.coarse.clear();
    }
}

/// The remembered sets for every region of the heap, indexed by region.
pub struct RegionRemSets {
    sets: Box<[RegionRemSet]>,
}

impl RegionRemSets {
    /// Create empty remembered sets for `num_regions` regions.
    pub fn new(
        num_regions: usize,
        cards_per_region: usize,
        sparse_cap: usize,
        fine_cap: usize,
    ) -> Self {
        Self {
            sets: (0..num_regions)
                .map(|_| RegionRemSet::new(cards_per_region, num_regions, sparse_cap, fine_cap))
                .collect(),
        }
    }

    /// The remembered set of region `idx`.
    #[inline]
    pub fn get(&self, idx: RegionIndex) -> &RegionRemSet {
        &self.sets[idx]
    }

    /// Number of regions covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Check whether the heap has no regions (degenerate geometry).
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
