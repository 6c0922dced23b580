//! Dirty-card queueing.
//!
//! Decouples the cheap, lock-free act of "a pointer was just written"
//! from the comparatively expensive act of updating a remembered set.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Dirty-Card Queue System                                            │
//! │                                                                     │
//! │  Mutator 1          Mutator 2          Mutator N                    │
//! │  ┌────────────┐    ┌────────────┐    ┌────────────┐                │
//! │  │ DirtyCard  │    │ DirtyCard  │    │ DirtyCard  │                │
//! │  │ Queue      │    │ Queue      │    │ Queue      │                │
//! │  │ [cards...] │    │ [cards...] │    │ [cards...] │                │
//! │  └─────┬──────┘    └─────┬──────┘    └─────┬──────┘                │
//! │        │ full             │ full            │ full                  │
//! │        └──────────────────┼─────────────────┘                      │
//! │                           ▼                                         │
//! │                ┌─────────────────────┐                             │
//! │                │ DirtyCardQueueSet   │  one coarse lock:           │
//! │                │  completed: FIFO    │  completed list + free list │
//! │                │  free:      stack   │                             │
//! │                └──────────┬──────────┘                             │
//! │                           │ try_claim                              │
//! │                           ▼                                         │
//! │                ┌─────────────────────┐                             │
//! │                │ Concurrent Refine   │  (drains, recycles nodes)   │
//! │                └─────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Buffer nodes carry an arena identity and are recycled by value through
//! the free stack — ownership moves, no pointer-based reuse. At any
//! instant a node is in exactly one state: on the free stack, active in
//! one producer, on the completed list, or claimed by one refiner.

mod buffer;
mod queue_set;

#[cfg(test)]
mod queue_tests;

pub use buffer::{BufferNode, NO_CARD};
pub use queue_set::{DirtyCardQueue, DirtyCardQueueSet, EnqueueOutcome, SharedDirtyCardQueue};
