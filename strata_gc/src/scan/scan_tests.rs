//! Tests for merge, parallel scan, and cleanup.

use parking_lot::Mutex;

use crate::card_table::CARD_SCANNED;
use crate::queue::DirtyCardQueue;
use crate::region::RegionKind;
use crate::test_support::{region_base, test_rem_set};
use crate::walker::PointerSlot;

// =============================================================================
// Merge: Remembered Sets
// =============================================================================

#[test]
fn test_merge_rset_cards_onto_table() {
    let (rs, heap, config) = test_rem_set();
    // Region 10 is being evacuated; regions 1 and 2 hold cards into it.
    heap.dir.set_in_collection_set(10, true);
    rs.rsets().get(10).add_card(1, 3);
    rs.rsets().get(10).add_card(1, 7);
    rs.rsets().get(10).add_card(2, 0);

    rs.prepare_increment();
    rs.merge_task(&[10], &[], 1).work(0, 1);

    for (src, off) in [(1, 3), (1, 7), (2, 0)] {
        let card = rs.card_table().card_of_region_offset(src, off);
        assert!(rs.card_table().is_dirty(card));
        let chunk = off / config.cards_per_chunk;
        assert!(rs.scan_state().chunk_flagged(src, chunk));
    }
    assert!(rs.scan_state().next_dirty_regions().contains(1));
    assert!(rs.scan_state().next_dirty_regions().contains(2));
    // The evacuated region is scheduled for clearing, not scanning.
    assert!(rs.scan_state().clear_regions().contains(10));
    assert!(!rs.scan_state().next_dirty_regions().contains(10));
    assert_eq!(rs.stats().merged_sparse, 3);
}

#[test]
fn test_merge_skips_sources_in_collection_set() {
    let (rs, heap, _config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    heap.dir.set_in_collection_set(1, true); // source is evacuated too
    rs.rsets().get(10).add_card(1, 3);

    rs.prepare_increment();
    rs.merge_task(&[10], &[], 1).work(0, 1);

    let card = rs.card_table().card_of_region_offset(1, 3);
    assert!(!rs.card_table().is_dirty(card));
    assert_eq!(rs.stats().merged_sparse, 0);
}

#[test]
fn test_merge_skips_cards_beyond_scan_top() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    // Source region 1 only has one live card's worth of data.
    heap.dir.set_top(1, region_base(&config, 1) + config.card_size);
    rs.rsets().get(10).add_card(1, 0); // below top
    rs.rsets().get(10).add_card(1, 5); // beyond top — stale

    rs.prepare_increment();
    rs.merge_task(&[10], &[], 1).work(0, 1);

    assert!(rs
        .card_table()
        .is_dirty(rs.card_table().card_of_region_offset(1, 0)));
    assert!(!rs
        .card_table()
        .is_dirty(rs.card_table().card_of_region_offset(1, 5)));
    assert_eq!(rs.stats().merged_sparse, 1);
}

#[test]
fn test_merge_coarse_covers_source_region() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    // Overflow source 1 to fine then force coarsening by filling distinct
    // fine sources past the cap.
    for src in 1..=config.fine_tables_cap + 1 {
        for off in 0..=config.sparse_table_cap {
            rs.rsets().get(10).add_card(src, off);
        }
    }
    let mut coarse_sources = Vec::new();
    rs.rsets()
        .get(10)
        .for_each_coarse_region(|src| coarse_sources.push(src));
    assert_eq!(coarse_sources.len(), 1);
    let coarse_src = coarse_sources[0];

    rs.prepare_increment();
    rs.merge_task(&[10], &[], 1).work(0, 1);

    // Every card of the coarsened source (up to its top) is dirty.
    for off in 0..config.cards_per_region() {
        let card = rs.card_table().card_of_region_offset(coarse_src, off);
        assert!(rs.card_table().is_dirty(card), "card offset {off}");
    }
    assert_eq!(rs.stats().merged_coarse as usize, config.cards_per_region());
}

// =============================================================================
// Merge: Hot Cache & Log Buffers
// =============================================================================

#[test]
fn test_merge_drains_hot_cache() {
    let (rs, _heap, _config) = test_rem_set();
    let card = rs.card_table().card_of_region_offset(2, 9);
    rs.card_table().mark_card_dirty(card);
    rs.refine_context().hot.push(card);

    rs.prepare_increment();
    rs.merge_task(&[], &[], 1).work(0, 1);

    assert!(rs.card_table().is_dirty(card));
    assert!(rs.scan_state().next_dirty_regions().contains(2));
    assert_eq!(rs.stats().merged_hot, 1);
    assert_eq!(rs.refine_context().hot.occupancy(), 0);
}

#[test]
fn test_merge_pulls_leftover_log_buffers() {
    let (rs, _heap, config) = test_rem_set();
    let mut queue = DirtyCardQueue::new();
    for off in 0..config.buffer_capacity {
        let card = rs.card_table().card_of_region_offset(3, off);
        rs.card_table().mark_card_dirty(card);
        queue.enqueue(card, rs.queue_set());
    }
    assert_eq!(rs.queue_set().completed_len(), 1);

    rs.prepare_increment();
    rs.merge_task(&[], &[], 2).work(0, 2);

    assert_eq!(rs.stats().merged_log as usize, config.buffer_capacity);
    assert_eq!(rs.queue_set().completed_len(), 0);
    assert_eq!(rs.queue_set().active_nodes(), 0); // nodes recycled
    assert!(rs.scan_state().next_dirty_regions().contains(3));
}

#[test]
fn test_merge_log_respects_eligibility() {
    let (rs, heap, _config) = test_rem_set();
    heap.dir.set_kind(4, RegionKind::Young);
    let mut queue = DirtyCardQueue::new();
    let card = rs.card_table().card_of_region_offset(4, 0);
    rs.card_table().mark_card_dirty(card);
    queue.enqueue(card, rs.queue_set());
    queue.flush(rs.queue_set());

    rs.prepare_increment();
    rs.merge_task(&[], &[], 1).work(0, 1);

    assert_eq!(rs.stats().merged_log, 0);
    assert!(!rs.scan_state().next_dirty_regions().contains(4));
}

// =============================================================================
// Scan
// =============================================================================

/// Merge one increment and scan it with one worker, collecting slots.
fn merge_and_scan(rs: &crate::rem_set::RemSet, increment: &[usize]) -> Vec<PointerSlot> {
    rs.prepare_increment();
    rs.merge_task(increment, &[], 1).work(0, 1);
    let mut delivered = Vec::new();
    rs.scan_task().work(0, 1, &mut |slot| delivered.push(slot));
    delivered
}

#[test]
fn test_scan_delivers_pointers_from_dirty_cards() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);

    let slot = region_base(&config, 1) + 5 * config.card_size + 16;
    let value = region_base(&config, 10) + 64;
    heap.put_slot(slot, value);
    rs.rsets().get(10).add_card(1, 5);

    let delivered = merge_and_scan(&rs, &[10]);
    assert_eq!(delivered, vec![PointerSlot { slot, value }]);

    // The card is marked scanned afterwards.
    let card = rs.card_table().card_of_region_offset(1, 5);
    assert_eq!(rs.card_table().state(card), CARD_SCANNED);
    assert!(rs.stats().cards_scanned >= 1);
}

#[test]
fn test_scan_clamps_to_snapshot_top() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    // Slot sits beyond the region's top: must not be delivered.
    heap.dir.set_top(1, region_base(&config, 1) + config.card_size);
    let stale_slot = region_base(&config, 1) + 3 * config.card_size;
    heap.put_slot(stale_slot, region_base(&config, 10));
    rs.rsets().get(10).add_card(1, 3);

    let delivered = merge_and_scan(&rs, &[10]);
    assert!(delivered.is_empty());
}

#[test]
fn test_scan_second_increment_skips_scanned_cards() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    let slot = region_base(&config, 1) + 16;
    heap.put_slot(slot, region_base(&config, 10));
    rs.rsets().get(10).add_card(1, 0);

    let first = merge_and_scan(&rs, &[10]);
    assert_eq!(first.len(), 1);

    // Second increment in the same pause: the remembered set still holds
    // the card, but its state is already scanned — no redelivery.
    let second = merge_and_scan(&rs, &[10]);
    assert!(second.is_empty());
}

#[test]
fn test_parallel_scan_delivers_each_slot_once() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);

    // Slots spread over many chunks of two source regions.
    let mut expected = Vec::new();
    for src in [1usize, 2] {
        for off in (0..config.cards_per_region()).step_by(3) {
            let slot = region_base(&config, src) + off * config.card_size + 8;
            let value = region_base(&config, 10) + off;
            heap.put_slot(slot, value);
            rs.rsets().get(10).add_card(src, off);
            expected.push(PointerSlot { slot, value });
        }
    }

    rs.prepare_increment();
    let merge = rs.merge_task(&[10], &[], 4);
    let merge_ref = &merge;
    std::thread::scope(|s| {
        for w in 0..4 {
            s.spawn(move || merge_ref.work(w, 4));
        }
    });

    let scan = rs.scan_task();
    let scan_ref = &scan;
    let delivered = Mutex::new(Vec::new());
    let delivered_ref = &delivered;
    std::thread::scope(|s| {
        for w in 0..4 {
            s.spawn(move || {
                let mut local = Vec::new();
                scan_ref.work(w, 4, &mut |slot| local.push(slot));
                delivered_ref.lock().extend(local);
            });
        }
    });

    let mut got = delivered.into_inner();
    got.sort_by_key(|s| s.slot);
    expected.sort_by_key(|s| s.slot);
    assert_eq!(got, expected); // every slot exactly once, none missed
}

// =============================================================================
// Cleanup
// =============================================================================

#[test]
fn test_cleanup_clears_only_touched_regions() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    let slot = region_base(&config, 1) + 16;
    heap.put_slot(slot, region_base(&config, 10));
    rs.rsets().get(10).add_card(1, 0);

    // An unrelated dirty card in a region nothing merged: left alone.
    let untouched = rs.card_table().card_of_region_offset(8, 2);
    rs.card_table().mark_card_dirty(untouched);

    merge_and_scan(&rs, &[10]);

    let cleanup = rs.cleanup_task();
    assert_eq!(cleanup.num_regions(), 2); // region 1 + cset region 10
    cleanup.work(0, 1);
    rs.finish_cycle();

    let (first, last) = rs.card_table().card_range_of_region(1);
    assert_eq!(rs.card_table().count_dirty(first, last), 0);
    let card = rs.card_table().card_of_region_offset(1, 0);
    assert_ne!(rs.card_table().state(card), CARD_SCANNED);

    // The untouched region kept its dirty card.
    assert!(rs.card_table().is_dirty(untouched));
    assert!(rs.scan_state().all_dirty_regions().is_empty());
}

#[test]
fn test_cleanup_parallel_workers_cover_all_chunks() {
    let (rs, heap, config) = test_rem_set();
    heap.dir.set_in_collection_set(10, true);
    for off in 0..config.cards_per_region() {
        rs.rsets().get(10).add_card(1, off);
    }
    rs.prepare_increment();
    rs.merge_task(&[10], &[], 1).work(0, 1);

    let cleanup = rs.cleanup_task();
    let cleanup_ref = &cleanup;
    std::thread::scope(|s| {
        for w in 0..4 {
            s.spawn(move || cleanup_ref.work(w, 4));
        }
    });
    rs.finish_cycle();

    let (first, last) = rs.card_table().card_range_of_region(1);
    assert_eq!(rs.card_table().count_dirty(first, last), 0);
    let (cfirst, clast) = rs.card_table().card_range_of_region(10);
    assert_eq!(rs.card_table().count_dirty(cfirst, clast), 0);
}

// =============================================================================
// Reclaim Candidates
// =============================================================================

#[test]
fn test_reclaim_candidate_rsets_flush_first() {
    let (rs, _heap, _config) = test_rem_set();
    // Region 11 is a humongous eager-reclaim candidate; its remembered
    // set is flushed even though it is not in the increment.
    rs.rsets().get(11).add_card(2, 4);

    rs.prepare_increment();
    rs.merge_task(&[], &[11], 1).work(0, 1);

    let card = rs.card_table().card_of_region_offset(2, 4);
    assert!(rs.card_table().is_dirty(card));
    assert!(rs.scan_state().next_dirty_regions().contains(2));
}
