//! Post-write barrier glue.
//!
//! The compiled/interpreted barrier emission is the embedder's business;
//! these functions are the slow-path the emitted code calls after a
//! pointer store. The contract with the collector:
//!
//! - the card is dirtied *after* the pointer store, separated by a fence,
//!   so no thread can observe the stale pointer behind a clean card;
//! - the card is enqueued only on the clean→dirty transition, so a card
//!   hammered by repeated stores costs one queue entry per collection;
//! - when the queue set reports backpressure, the storing thread refines
//!   one completed buffer synchronously before returning.

use std::sync::atomic::{fence, Ordering};

use crate::queue::{DirtyCardQueue, EnqueueOutcome};
use crate::refine::mutator_assist;
use crate::rem_set::RemSet;

/// Post-write barrier for a pointer store `*slot = new_value`.
///
/// Call after the store. `queue` is the calling thread's dirty-card
/// queue. Null stores and same-region stores are filtered out — they can
/// never create a cross-region reference.
#[inline(always)]
pub fn post_write_barrier(rs: &RemSet, queue: &mut DirtyCardQueue, slot: usize, new_value: usize) {
    if new_value == 0 {
        return;
    }
    let table = rs.card_table();
    let (Some(src), Some(dst)) = (table.region_of_addr(slot), table.region_of_addr(new_value))
    else {
        return;
    };
    if src == dst {
        return;
    }
    post_write_barrier_slow(rs, queue, slot);
}

/// Unfiltered barrier slow path: dirty the slot's card and enqueue it.
///
/// Used directly when the caller has already established the store is
/// interesting (e.g. an unconditional barrier in generated code).
#[inline]
pub fn post_write_barrier_slow(rs: &RemSet, queue: &mut DirtyCardQueue, slot: usize) {
    // Order the preceding pointer store before the card store: a refiner
    // that sees the dirty card must also see the new pointer value.
    fence(Ordering::SeqCst);

    let table = rs.card_table();
    let Some(card) = table.card_index(slot) else {
        return;
    };
    if !table.mark_card_dirty(card) {
        // Already dirty: someone else owes the queue entry.
        return;
    }
    if queue.enqueue(card, rs.queue_set()) == EnqueueOutcome::MustRefine {
        // Backpressure: pay one buffer's refinement cost here rather than
        // let the completed list grow without bound.
        mutator_assist(&rs.refine_context());
    }
}
