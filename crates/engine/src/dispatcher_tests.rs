// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lw_core::test_support::queued_item;
use lw_core::SessionId;

fn entry(score: f64, enqueued_at_ms: u64, seq: u64) -> ReadyEntry {
    let mut item = queued_item(SessionId::from_string("ses-t"), "a.example.com", score);
    item.enqueued_at_ms = enqueued_at_ms;
    ReadyEntry { bucket: item.score_bucket(), enqueued_at_ms, seq, item }
}

fn pop_order(entries: Vec<ReadyEntry>) -> Vec<u64> {
    let mut heap: BinaryHeap<ReadyEntry> = entries.into_iter().collect();
    let mut seqs = Vec::new();
    while let Some(entry) = heap.pop() {
        seqs.push(entry.seq);
    }
    seqs
}

#[test]
fn higher_score_bucket_dispatches_first() {
    let order = pop_order(vec![entry(0.5, 100, 1), entry(0.9, 100, 2), entry(0.7, 100, 3)]);
    assert_eq!(order, vec![2, 3, 1]);
}

#[test]
fn same_bucket_orders_by_enqueue_time() {
    // 0.81 and 0.89 share bucket 8; the older one wins.
    let order = pop_order(vec![entry(0.89, 200, 1), entry(0.81, 100, 2)]);
    assert_eq!(order, vec![2, 1]);
}

#[test]
fn tiny_score_gap_does_not_starve_older_items() {
    // 0.80 vs 0.801: same bucket, so the hour-old item goes first.
    let order = pop_order(vec![entry(0.801, 3_600_000, 1), entry(0.80, 0, 2)]);
    assert_eq!(order, vec![2, 1]);
}

#[test]
fn full_tie_breaks_by_insertion_order() {
    let order = pop_order(vec![entry(0.8, 100, 2), entry(0.8, 100, 1), entry(0.8, 100, 3)]);
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn bucket_dominates_age() {
    // A newer high-score item beats an older low-score one.
    let order = pop_order(vec![entry(0.2, 0, 1), entry(0.9, 9_999_999, 2)]);
    assert_eq!(order, vec![2, 1]);
}
