//! Strata Remembered-Set Subsystem
//!
//! The concurrent, card-table-based remembered-set machinery of a
//! generational, region-based collector: it tracks, without stopping
//! application threads, which regions contain pointers into regions about
//! to be evacuated, so a collection pause only examines a bounded,
//! relevant subset of the heap.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  mutator write                                                          │
//! │       │  post_write_barrier: dirty card (after store, fenced)           │
//! │       ▼                                                                 │
//! │  DirtyCardQueue (per thread) ──full──► DirtyCardQueueSet (one lock)     │
//! │                                              │                          │
//! │                          claim ┌─────────────┤ leftover buffers         │
//! │                                ▼             │                          │
//! │                    ConcurrentRefinement      │                          │
//! │                    fold cards into           │                          │
//! │                    RegionRemSet              │                          │
//! │                    (sparse→fine→coarse)      │                          │
//! │                                │             │                          │
//! │  ══ pause ════════════════════╪═════════════╪═════════════════════════ │
//! │                                ▼             ▼                          │
//! │        MergeTask: rsets ∪ HotCardCache ∪ log buffers → card table       │
//! │                                │  (barrier)                             │
//! │                                ▼                                        │
//! │        ScanTask: claim chunks, find dirty runs, deliver pointers        │
//! │                                │  (barrier)                             │
//! │                                ▼                                        │
//! │        CleanupTask: clear touched card ranges                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Region layout, object copying, liveness marking, and work-gang
//! scheduling stay outside, reached through the [`RegionProvider`],
//! [`ObjectWalker`], and [`Liveness`] traits and the `work(worker_id,
//! num_workers)` task entry points.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod card_table;
pub mod config;
pub mod hot_card;
pub mod queue;
pub mod rebuild;
pub mod refine;
pub mod region;
pub mod rem_set;
pub mod rset;
pub mod scan;
pub mod stats;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenient access
pub use barrier::{post_write_barrier, post_write_barrier_slow};
pub use card_table::{CardIndex, CardTable, CARD_CLEAN, CARD_DIRTY, CARD_SCANNED};
pub use config::{ConfigError, RemSetConfig};
pub use hot_card::{CardCounts, HotCardCache};
pub use queue::{BufferNode, DirtyCardQueue, DirtyCardQueueSet, EnqueueOutcome};
pub use rebuild::{RebuildOutcome, RebuildTask};
pub use refine::{ConcurrentRefinement, RefineContext, RefineOutcome};
pub use region::{RegionDirectory, RegionIndex, RegionInfo, RegionKind, RegionProvider};
pub use rem_set::RemSet;
pub use rset::{AddOutcome, RegionRemSet, RegionRemSets, RemSetOccupancy};
pub use scan::{CleanupTask, MergeTask, ScanState, ScanTask};
pub use stats::{RemSetStats, RemSetStatsSnapshot};
pub use walker::{Liveness, NoopObjectWalker, ObjectWalker, PointerSlot, WalkOutcome};
