// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::criteria::MessageQuery;
use parking_lot::Mutex as PlMutex;
use std::sync::Arc;
use tempfile::TempDir;
use zs_core::{test_support, FakeClock};

fn open_ledger() -> (TempDir, Ledger<FakeClock>, FakeClock) {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let ledger = Ledger::open_with_clock(dir.path().join("test.db"), clock.clone()).unwrap();
    (dir, ledger, clock)
}

fn cluster() -> ClusterId {
    ClusterId::new("cluster-test-1")
}

#[test]
fn append_materializes_id_and_timestamp() {
    let (_dir, ledger, clock) = open_ledger();
    clock.set_epoch_ms(500);
    let msg = ledger
        .append(&cluster(), test_support::draft("ISSUE_OPENED", "orchestrator"))
        .unwrap()
        .unwrap();
    assert!(msg.id.as_str().starts_with("msg-"));
    assert_eq!(msg.timestamp, 500);
}

#[test]
fn timestamps_strictly_increase_even_with_frozen_clock() {
    let (_dir, ledger, clock) = open_ledger();
    clock.set_epoch_ms(100);
    let mut last = 0;
    for _ in 0..5 {
        let msg = ledger.append(&cluster(), test_support::draft("T", "s")).unwrap().unwrap();
        assert!(msg.timestamp > last, "timestamps must strictly increase");
        last = msg.timestamp;
    }
}

#[test]
fn caller_timestamp_honored_only_if_greater() {
    let (_dir, ledger, clock) = open_ledger();
    clock.set_epoch_ms(100);
    let first = ledger.append(&cluster(), test_support::draft("T", "s")).unwrap().unwrap();

    let mut backdated = test_support::draft("T", "s");
    backdated.timestamp = Some(first.timestamp - 50);
    let second = ledger.append(&cluster(), backdated).unwrap().unwrap();
    assert!(second.timestamp > first.timestamp);

    let mut forward = test_support::draft("T", "s");
    forward.timestamp = Some(second.timestamp + 500);
    let third = ledger.append(&cluster(), forward).unwrap().unwrap();
    assert_eq!(third.timestamp, second.timestamp + 500);
}

#[test]
fn batch_append_is_contiguous_and_ordered() {
    let (_dir, ledger, clock) = open_ledger();
    clock.set_epoch_ms(1_000);
    let batch = ledger
        .batch_append(
            &cluster(),
            vec![
                test_support::draft("A", "s"),
                test_support::draft("B", "s"),
                test_support::draft("C", "s"),
            ],
        )
        .unwrap()
        .unwrap();
    let stamps: Vec<u64> = batch.iter().map(|m| m.timestamp).collect();
    assert_eq!(stamps, vec![1_000, 1_001, 1_002]);
}

#[test]
fn batch_signals_fire_after_commit_in_order() {
    let (_dir, ledger, _clock) = open_ledger();
    let seen: Arc<PlMutex<Vec<(String, u64)>>> = Arc::new(PlMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let ledger_probe = Arc::new(ledger);
    let probe = Arc::clone(&ledger_probe);
    let _sub = ledger_probe.subscribe(move |msg| {
        // Committed before any signal fires: the store must already see it.
        let count = probe
            .count(&MessageQuery::for_cluster(msg.cluster_id.clone()).topic(msg.topic.as_str()))
            .unwrap();
        assert!(count >= 1);
        sink.lock().push((msg.topic.as_str().to_string(), msg.timestamp));
    });

    ledger_probe
        .batch_append(&cluster(), vec![test_support::draft("A", "s"), test_support::draft("B", "s")])
        .unwrap()
        .unwrap();

    let order = seen.lock();
    assert_eq!(order.len(), 2);
    assert_eq!(order[0].0, "A");
    assert_eq!(order[1].0, "B");
    assert!(order[0].1 < order[1].1);
}

#[test]
fn closed_ledger_swallows_appends() {
    let (_dir, ledger, _clock) = open_ledger();
    ledger.append(&cluster(), test_support::draft("A", "s")).unwrap().unwrap();
    ledger.close();
    assert!(ledger.is_closed());
    let result = ledger.append(&cluster(), test_support::draft("B", "s")).unwrap();
    assert!(result.is_none());
}

#[test]
fn query_filters_compose() {
    let (_dir, ledger, _clock) = open_ledger();
    ledger
        .append(&cluster(), test_support::draft("PLAN_READY", "planner"))
        .unwrap();
    ledger
        .append(&cluster(), test_support::draft("PLAN_READY", "reviewer"))
        .unwrap();
    ledger
        .append(&cluster(), test_support::draft("AGENT_OUTPUT", "planner"))
        .unwrap();

    let plans = ledger
        .query(&MessageQuery::for_cluster(cluster()).topic("PLAN_READY"))
        .unwrap();
    assert_eq!(plans.len(), 2);

    let from_planner = ledger
        .query(&MessageQuery::for_cluster(cluster()).topic("PLAN_READY").sender("planner"))
        .unwrap();
    assert_eq!(from_planner.len(), 1);
}

#[test]
fn query_respects_limit_offset_and_order() {
    let (_dir, ledger, _clock) = open_ledger();
    for i in 0..5 {
        ledger
            .append(&cluster(), test_support::draft("T", "s").text(format!("m{i}")))
            .unwrap();
    }
    let desc = ledger
        .query(&MessageQuery::for_cluster(cluster()).order(SortOrder::Desc).limit(2))
        .unwrap();
    assert_eq!(desc[0].content.text.as_deref(), Some("m4"));
    assert_eq!(desc[1].content.text.as_deref(), Some("m3"));

    let paged = ledger
        .query(&MessageQuery::for_cluster(cluster()).limit(2).offset(1))
        .unwrap();
    assert_eq!(paged[0].content.text.as_deref(), Some("m1"));
}

#[test]
fn find_last_returns_newest_match() {
    let (_dir, ledger, _clock) = open_ledger();
    ledger.append(&cluster(), test_support::draft("T", "s").text("old")).unwrap();
    ledger.append(&cluster(), test_support::draft("T", "s").text("new")).unwrap();
    let last = ledger
        .find_last(&MessageQuery::for_cluster(cluster()).topic("T"))
        .unwrap()
        .unwrap();
    assert_eq!(last.content.text.as_deref(), Some("new"));
    assert!(ledger
        .find_last(&MessageQuery::for_cluster(cluster()).topic("NOPE"))
        .unwrap()
        .is_none());
}

#[test]
fn cluster_id_partitions_the_log() {
    let (_dir, ledger, _clock) = open_ledger();
    let other = ClusterId::new("cluster-other-2");
    ledger.append(&cluster(), test_support::draft("T", "s")).unwrap();
    ledger.append(&other, test_support::draft("T", "s")).unwrap();

    assert_eq!(ledger.get_all(&cluster()).unwrap().len(), 1);
    assert_eq!(ledger.get_all(&other).unwrap().len(), 1);
}

#[test]
fn since_is_inclusive() {
    let (_dir, ledger, _clock) = open_ledger();
    let first = ledger.append(&cluster(), test_support::draft("A", "s")).unwrap().unwrap();
    ledger.append(&cluster(), test_support::draft("B", "s")).unwrap().unwrap();
    let tail = ledger.since(&cluster(), first.timestamp).unwrap();
    assert_eq!(tail.len(), 2);
}

#[test]
fn reopen_resumes_timestamp_sequence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db");
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000);
    let last = {
        let ledger = Ledger::open_with_clock(&path, clock.clone()).unwrap();
        ledger.append(&cluster(), test_support::draft("A", "s")).unwrap().unwrap().timestamp
    };

    // Second process with a clock behind the stored maximum.
    let late_clock = FakeClock::new();
    late_clock.set_epoch_ms(10);
    let reopened = Ledger::open_with_clock(&path, late_clock).unwrap();
    let next = reopened.append(&cluster(), test_support::draft("B", "s")).unwrap().unwrap();
    assert!(next.timestamp > last);
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]
    #[test]
    fn timestamps_strictly_increase_for_any_batching(
        sizes in proptest::collection::vec(1usize..4, 1..6),
    ) {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::new();
        clock.set_epoch_ms(100);
        let ledger = Ledger::open_with_clock(dir.path().join("prop.db"), clock).unwrap();

        let mut stamps = Vec::new();
        for size in sizes {
            let drafts = (0..size).map(|_| test_support::draft("T", "s")).collect();
            let batch = ledger.batch_append(&cluster(), drafts).unwrap().unwrap();
            stamps.extend(batch.into_iter().map(|m| m.timestamp));
        }
        for pair in stamps.windows(2) {
            proptest::prop_assert!(pair[0] < pair[1]);
        }
    }
}

#[test]
fn stored_payloads_roundtrip() {
    let (_dir, ledger, _clock) = open_ledger();
    let draft = test_support::draft("VALIDATION_RESULT", "validator")
        .text("looks good")
        .data(serde_json::json!({"approved": true, "issues": []}))
        .metadata(serde_json::json!({"attempt": 1}));
    let appended = ledger.append(&cluster(), draft).unwrap().unwrap();
    let read = ledger.get_all(&cluster()).unwrap().pop().unwrap();
    assert_eq!(read, appended);
}
