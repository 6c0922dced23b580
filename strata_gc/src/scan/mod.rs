//! Pause-time remembered-set processing.
//!
//! An evacuation pause processes cards in three strictly ordered parallel
//! phases, each a task run on the embedder's work gang:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Evacuation Increment                                               │
//! │                                                                     │
//! │  prepare_increment (single-threaded)                                │
//! │    snapshot per-region allocation tops                              │
//! │         │                                                           │
//! │         ▼                                                           │
//! │  MergeTask (parallel) ── rsets ∪ hot cache ∪ log buffers ──► table  │
//! │         │  barrier: all workers finish merge                        │
//! │         ▼                                                           │
//! │  ScanTask (parallel) ── claim chunks, find dirty runs,              │
//! │         │               deliver pointers to the closure             │
//! │         │  barrier: all workers finish scan                         │
//! │         ▼                                                           │
//! │  CleanupTask (parallel) ── clear touched card ranges                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The barriers between phases belong to the embedder's gang scheduler;
//! the tasks here only promise that `work` returns when a worker's share
//! is done.

mod merge;
mod scan_state;
mod scanner;

#[cfg(test)]
mod scan_tests;

pub use merge::MergeTask;
pub use scan_state::{DirtyRegionList, ScanState};
pub use scanner::{CleanupTask, ScanTask};
