// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use zs_core::{ClusterId, MessageDraft};

fn msg(topic: &str, sender: &str, text: Option<&str>, data: Option<serde_json::Value>) -> Message {
    let mut draft = MessageDraft::new(topic, sender);
    if let Some(text) = text {
        draft = draft.text(text);
    }
    if let Some(data) = data {
        draft = draft.data(data);
    }
    draft.materialize(ClusterId::new("cluster-x"), 1_700_000_000_000)
}

#[test]
fn text_preview_uses_first_line() {
    let line = format_message(&msg("PLAN_READY", "planner", Some("line one\nline two"), None));
    assert!(line.contains("PLAN_READY"));
    assert!(line.contains("planner"));
    assert!(line.contains("line one"));
    assert!(!line.contains("line two"));
}

#[test]
fn data_preview_prefers_telling_fields() {
    let line = format_message(&msg(
        "AGENT_LIFECYCLE",
        "worker",
        None,
        Some(serde_json::json!({"event": "TASK_STARTED", "iteration": 2})),
    ));
    assert!(line.contains("TASK_STARTED"));

    let line = format_message(&msg(
        "CLUSTER_FAILED",
        "orchestrator",
        None,
        Some(serde_json::json!({"reason": "CONDUCTOR_WATCHDOG_TIMEOUT"})),
    ));
    assert!(line.contains("CONDUCTOR_WATCHDOG_TIMEOUT"));
}

#[test]
fn long_previews_are_truncated() {
    let long = "x".repeat(300);
    let line = format_message(&msg("T", "s", Some(&long), None));
    assert!(line.len() < 220);
    assert!(line.contains('…'));
}
