// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process ledger and registry properties.

use crate::specs::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use zs_core::{ClusterState, MessageDraft};
use zs_ledger::{Ledger, MessageQuery};

#[tokio::test(flavor = "multi_thread")]
async fn a_second_handle_on_the_same_file_sees_a_monotone_prefix() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let cluster = ClusterId::new("cluster-shared-1");

    // Writer and reader are independent connections, as two processes
    // would hold.
    let writer = Arc::new(Ledger::open(&path).unwrap());
    let reader = Arc::new(Ledger::open(&path).unwrap());

    let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    let _poll = reader.poll_for_messages(
        Some(cluster.clone()),
        move |msg| sink.lock().unwrap().push(msg.id.as_str().to_string()),
        Duration::from_millis(20),
        100,
    );

    for i in 0..20 {
        writer.append(&cluster, MessageDraft::new("T", "writer").text(format!("m{i}"))).unwrap();
        if i % 5 == 0 {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    }

    assert!(wait_for(SPEC_WAIT, || seen.lock().unwrap().len() == 20).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Exactly once per id, in append order.
    let ids = seen.lock().unwrap().clone();
    assert_eq!(ids.len(), 20);
    let unique: std::collections::HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), 20);

    let stored = writer.get_all(&cluster).unwrap();
    let stored_ids: Vec<String> = stored.iter().map(|m| m.id.as_str().to_string()).collect();
    assert_eq!(ids, stored_ids);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_appends_admit_no_interleaving_even_under_contention() {
    let dir = tempfile::TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("contended.db")).unwrap());
    let cluster = ClusterId::new("cluster-contended-1");

    let mut tasks = Vec::new();
    for sender in 0..4 {
        let ledger = Arc::clone(&ledger);
        let cluster = cluster.clone();
        tasks.push(tokio::spawn(async move {
            for batch in 0..10 {
                let drafts = (0..3)
                    .map(|i| {
                        MessageDraft::new("B", format!("sender-{sender}"))
                            .text(format!("s{sender}-b{batch}-{i}"))
                    })
                    .collect();
                ledger.batch_append(&cluster, drafts).unwrap().unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Every batch occupies three contiguous timestamps from one sender.
    let all = ledger.query(&MessageQuery::for_cluster(cluster)).unwrap();
    assert_eq!(all.len(), 120);
    for window in all.chunks(3) {
        let senders: std::collections::HashSet<&str> =
            window.iter().map(|m| m.sender.as_str()).collect();
        assert_eq!(senders.len(), 1, "batch interleaved: {window:?}");
        assert_eq!(window[0].timestamp + 2, window[2].timestamp);
    }
}

#[test]
fn registry_race_loses_no_clusters() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    // Two racing writers, each persisting its own set of records through
    // the shared lock.
    let mut handles = Vec::new();
    for writer in 0..2 {
        let path = path.clone();
        handles.push(std::thread::spawn(move || {
            let registry = zs_engine::Registry::new(&path);
            for i in 0..25 {
                let id = ClusterId::new(format!("cluster-w{writer}-{i}"));
                let mut record = zs_engine::ClusterRecord::new(
                    id,
                    zs_blueprint::Blueprint::default(),
                    i as u64,
                );
                record.state = ClusterState::Stopped;
                record.pid = None;
                registry.persist(&record, false).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let map = zs_engine::Registry::new(&path).load().unwrap();
    assert_eq!(map.len(), 50, "no record may vanish under contention");
}
