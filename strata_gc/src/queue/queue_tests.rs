//! Tests for dirty-card queueing and node lifecycle.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::*;
use crate::config::RemSetConfig;
use crate::stats::RemSetStats;

fn queue_set(config: &RemSetConfig) -> DirtyCardQueueSet {
    DirtyCardQueueSet::new(config, Arc::new(RemSetStats::new()))
}

fn small_config() -> RemSetConfig {
    RemSetConfig {
        buffer_capacity: 4,
        max_free_buffers: 2,
        refine_activation_threshold: 1,
        mutator_refinement_threshold: 2,
        ..RemSetConfig::for_testing()
    }
}

// =============================================================================
// Enqueue / Handover
// =============================================================================

#[test]
fn test_enqueue_fills_then_hands_over_once() {
    let set = queue_set(&small_config());
    let mut queue = DirtyCardQueue::new();

    for card in 0..3 {
        assert_eq!(queue.enqueue(card, &set), EnqueueOutcome::Enqueued);
    }
    assert_eq!(set.completed_len(), 0);
    assert_eq!(queue.pending(), 3);

    // Fourth entry fills the buffer: exactly one handover.
    queue.enqueue(3, &set);
    assert_eq!(set.completed_len(), 1);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_try_claim_empty_returns_none() {
    let set = queue_set(&small_config());
    assert!(set.try_claim_completed().is_none());
}

#[test]
fn test_claimed_buffer_preserves_entries() {
    let set = queue_set(&small_config());
    let mut queue = DirtyCardQueue::new();
    for card in [10, 20, 30, 40] {
        queue.enqueue(card, &set);
    }

    let mut node = set.try_claim_completed().unwrap();
    let entries: Vec<_> = (0..node.len()).filter_map(|i| node.take_entry(i)).collect();
    assert_eq!(entries, vec![10, 20, 30, 40]);

    // Entries were nulled as processed.
    assert_eq!((0..node.len()).filter_map(|i| node.take_entry(i)).count(), 0);
}

#[test]
fn test_flush_hands_over_partial_buffer() {
    let set = queue_set(&small_config());
    let mut queue = DirtyCardQueue::new();
    queue.enqueue(5, &set);
    queue.flush(&set);

    assert_eq!(set.completed_len(), 1);
    let mut node = set.try_claim_completed().unwrap();
    assert_eq!(node.take_entry(0), Some(5));
}

#[test]
fn test_flush_without_buffer_is_noop() {
    let set = queue_set(&small_config());
    let mut queue = DirtyCardQueue::new();
    queue.flush(&set);
    assert_eq!(set.completed_len(), 0);
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_backpressure_reported_past_threshold() {
    let set = queue_set(&small_config()); // mutator threshold: 2
    let mut queue = DirtyCardQueue::new();

    let mut outcomes = Vec::new();
    for card in 0..16 {
        outcomes.push(queue.enqueue(card, &set));
    }

    // Buffers complete at cards 4, 8, 12, 16 → counts 1, 2, 3, 4.
    // MustRefine fires once the count exceeds 2.
    assert_eq!(outcomes[3], EnqueueOutcome::Enqueued);
    assert_eq!(outcomes[7], EnqueueOutcome::Enqueued);
    assert_eq!(outcomes[11], EnqueueOutcome::MustRefine);
    assert_eq!(outcomes[15], EnqueueOutcome::MustRefine);
}

// =============================================================================
// Node Lifecycle
// =============================================================================

#[test]
fn test_lifecycle_accounting_is_closed() {
    let set = queue_set(&small_config());
    let mut queue = DirtyCardQueue::new();

    // Active in one producer.
    queue.enqueue(1, &set);
    assert_eq!(set.live_nodes(), 1);
    assert_eq!(set.active_nodes(), 1);

    // Queued exactly once.
    for card in 2..=4 {
        queue.enqueue(card, &set);
    }
    assert_eq!(set.completed_len(), 1);
    assert_eq!(set.active_nodes(), 0);

    // Claimed by one refiner.
    let node = set.try_claim_completed().unwrap();
    assert_eq!(set.active_nodes(), 1);
    assert_eq!(set.completed_len(), 0);

    // Back on the free list.
    set.release_node(node);
    assert_eq!(set.active_nodes(), 0);
    assert_eq!(set.free_len(), 1);
    assert_eq!(set.live_nodes(), 1);
}

#[test]
fn test_nodes_recycle_by_identity() {
    let set = queue_set(&small_config());
    let node = set.allocate_node();
    let id = node.id();
    set.release_node(node);

    // The free stack hands the same node back.
    let node = set.allocate_node();
    assert_eq!(node.id(), id);
    assert!(node.is_empty());
    set.release_node(node);
}

#[test]
fn test_free_list_retention_cap() {
    let set = queue_set(&small_config()); // max_free_buffers: 2
    let nodes: Vec<_> = (0..4).map(|_| set.allocate_node()).collect();
    assert_eq!(set.live_nodes(), 4);

    for node in nodes {
        set.release_node(node);
    }
    // Two retained, two dropped.
    assert_eq!(set.free_len(), 2);
    assert_eq!(set.live_nodes(), 2);
}

#[test]
fn test_empty_buffer_handover_recycles() {
    let set = queue_set(&small_config());
    let node = set.allocate_node();
    set.push_completed(node);
    // Nothing to refine; the node went straight back to the free list.
    assert_eq!(set.completed_len(), 0);
    assert_eq!(set.free_len(), 1);
}

// =============================================================================
// Shared Queue & Parking
// =============================================================================

#[test]
fn test_shared_queue_explicit_flush() {
    let set = queue_set(&small_config());
    let shared = SharedDirtyCardQueue::new();
    shared.enqueue(7, &set);
    assert_eq!(set.completed_len(), 0);
    shared.flush(&set);
    assert_eq!(set.completed_len(), 1);
}

#[test]
fn test_park_returns_when_work_arrives() {
    let set = Arc::new(queue_set(&small_config()));
    let stopping = Arc::new(AtomicBool::new(false));

    let parked = {
        let set = Arc::clone(&set);
        let stopping = Arc::clone(&stopping);
        std::thread::spawn(move || {
            set.park_until_work(&stopping);
            set.try_claim_completed().is_some()
        })
    };

    // Publish one full buffer; the parked thread must wake and claim it.
    let mut queue = DirtyCardQueue::new();
    for card in 0..4 {
        queue.enqueue(card, &set);
    }
    assert!(parked.join().unwrap());
}

#[test]
fn test_park_returns_on_stop() {
    let set = Arc::new(queue_set(&small_config()));
    let stopping = Arc::new(AtomicBool::new(false));

    let parked = {
        let set = Arc::clone(&set);
        let stopping = Arc::clone(&stopping);
        std::thread::spawn(move || set.park_until_work(&stopping))
    };

    stopping.store(true, std::sync::atomic::Ordering::Release);
    set.notify_all();
    parked.join().unwrap();
}

// =============================================================================
// Concurrent Producers
// =============================================================================

#[test]
fn test_concurrent_producers_preserve_all_cards() {
    let set = Arc::new(queue_set(&RemSetConfig {
        buffer_capacity: 8,
        max_free_buffers: 16,
        refine_activation_threshold: usize::MAX, // no wakeups needed
        mutator_refinement_threshold: usize::MAX,
        ..RemSetConfig::for_testing()
    }));

    let threads = 4;
    let per_thread = 100;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                let mut queue = DirtyCardQueue::new();
                for i in 0..per_thread {
                    queue.enqueue(t * per_thread + i, &set);
                }
                queue.flush(&set);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut seen = Vec::new();
    while let Some(mut node) = set.try_claim_completed() {
        for i in 0..node.len() {
            if let Some(card) = node.take_entry(i) {
                seen.push(card);
            }
        }
        set.release_node(node);
    }
    seen.sort_unstable();
    let expected: Vec<_> = (0..threads * per_thread).collect();
    assert_eq!(seen, expected);
}
