//! Region metadata interface.
//!
//! Heap region allocation and layout belong to the embedding heap manager.
//! The remembered set only *reads* region metadata, queried by index, and
//! must tolerate regions that have been freed or were never committed
//! (`None`). It never mutates region state.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Index of a heap region.
pub type RegionIndex = usize;

/// The lifecycle kind of a region, as reported by the heap manager.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Uncommitted or reclaimed; nothing in it may be scanned.
    Free = 0,
    /// Young generation; collected wholesale, never refined into.
    Young = 1,
    /// Old generation; the primary remembered-set client.
    Old = 2,
    /// A humongous (multi-region) object; treated like old space.
    Humongous = 3,
    /// Immutable archive data; treated like old space.
    Archive = 4,
}

impl RegionKind {
    /// Regions of these kinds carry cards worth refining and scanning.
    #[inline]
    pub fn is_scannable(self) -> bool {
        matches!(
            self,
            RegionKind::Old | RegionKind::Humongous | RegionKind::Archive
        )
    }
}

/// Snapshot of one region's metadata.
#[derive(Debug, Clone, Copy)]
pub struct RegionInfo {
    /// Lifecycle kind.
    pub kind: RegionKind,
    /// Current allocation top (exclusive); addresses at or beyond it hold
    /// no objects yet.
    pub top: usize,
    /// Whether the region is part of the current collection set.
    pub in_collection_set: bool,
}

/// Read-only view of per-region metadata, provided by the heap manager.
///
/// Implementations must be callable from any thread: mutators, refinement
/// threads, and pause workers all consult it concurrently.
pub trait RegionProvider: Send + Sync {
    /// Metadata for region `idx`, or `None` if the region is not present
    /// (freed, never committed, or out of range).
    fn region(&self, idx: RegionIndex) -> Option<RegionInfo>;

    /// Number of region slots covered by the heap.
    fn num_regions(&self) -> usize;
}

/// A simple `Vec`-backed [`RegionProvider`].
///
/// Embedders with their own region table implement the trait directly;
/// this implementation serves small embeddings and the test suite. All
/// fields are atomic so tests can flip region state while other threads
/// read it.
pub struct RegionDirectory {
    kinds: Box<[AtomicU8]>,
    tops: Box<[AtomicUsize]>,
    in_cset: Box<[AtomicBool]>,
}

impl RegionDirectory {
    /// Create a directory of `num_regions` free regions.
    pub fn new(num_regions: usize) -> Self {
        Self {
            kinds: (0..num_regions)
                .map(|_| AtomicU8::new(RegionKind::Free as u8))
                .collect(),
            tops: (0..num_regions).map(|_| AtomicUsize::new(0)).collect(),
            in_cset: (0..num_regions).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Set a region's kind.
    pub fn set_kind(&self, idx: RegionIndex, kind: RegionKind) {
        self.kinds[idx].store(kind as u8, Ordering::Release);
    }

    /// Set a region's allocation top.
    pub fn set_top(&self, idx: RegionIndex, top: usize) {
        self.tops[idx].store(top, Ordering::Release);
    }

    /// Mark or unmark a region as part of the collection set.
    pub fn set_in_collection_set(&self, idx: RegionIndex, value: bool) {
        self.in_cset[idx].store(value, Ordering::Release);
    }

    /// Reset a region to free with no allocation.
    pub fn free_region(&self, idx: RegionIndex) {
        self.set_kind(idx, RegionKind::Free);
        self.set_top(idx, 0);
        self.set_in_collection_set(idx, false);
    }
}

impl RegionProvider for RegionDirectory {
    fn region(&self, idx: RegionIndex) -> Option<RegionInfo> {
        let kind = match self.kinds.get(idx)?.load(Ordering::Acquire) {
            0 => return None, // free regions are "not present"
            1 => RegionKind::Young,
            2 => RegionKind::Old,
            3 => RegionKind::Humongous,
            4 => RegionKind::Archive,
            k => unreachable!("invalid region kind {k}"),
        };
        Some(RegionInfo {
            kind,
            top: self.tops[idx].load(Ordering::Acquire),
            in_collection_set: self.in_cset[idx].load(Ordering::Acquire),
        })
    }

    fn num_regions(&self) -> usize {
        self.kinds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_starts_empty() {
        let dir = RegionDirectory::new(8);
        assert_eq!(dir.num_regions(), 8);
        for i in 0..8 {
            assert!(dir.region(i).is_none());
        }
    }

    #[test]
    fn test_directory_round_trip() {
        let dir = RegionDirectory::new(4);
        dir.set_kind(1, RegionKind::Old);
        dir.set_top(1, 0x1_8000);
        dir.set_in_collection_set(1, true);

        let info = dir.region(1).unwrap();
        assert_eq!(info.kind, RegionKind::Old);
        assert_eq!(info.top, 0x1_8000);
        assert!(info.in_collection_set);

        dir.free_region(1);
        assert!(dir.region(1).is_none());
    }

    #[test]
    fn test_out_of_range_is_none() {
        let dir = RegionDirectory::new(2);
        assert!(dir.region(5).is_none());
    }

    #[test]
    fn test_scannable_kinds() {
        assert!(RegionKind::Old.is_scannable());
        assert!(RegionKind::Humongous.is_scannable());
        assert!(RegionKind::Archive.is_scannable());
        assert!(!RegionKind::Young.is_scannable());
        assert!(!RegionKind::Free.is_scannable());
    }
}
