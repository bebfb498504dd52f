// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and helpers for other crates' tests.

use crate::cluster::ClusterId;
use crate::message::{Message, MessageDraft};
use crate::topic::Topic;
use serde_json::Value;

/// A materialized message with fixed cluster and timestamp, for tests that
/// never touch a real ledger.
pub fn message(topic: &str, sender: &str, timestamp: u64) -> Message {
    MessageDraft::new(topic, sender).materialize(ClusterId::new("cluster-test-1"), timestamp)
}

/// Like [`message`] but with a structured payload attached.
pub fn message_with_data(topic: &str, sender: &str, timestamp: u64, data: Value) -> Message {
    MessageDraft::new(topic, sender)
        .data(data)
        .materialize(ClusterId::new("cluster-test-1"), timestamp)
}

/// A draft addressed to everyone, ready for ledger append.
pub fn draft(topic: &str, sender: &str) -> MessageDraft {
    MessageDraft::new(Topic::new(topic), sender)
}
