// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host bindings available to predicate scripts.
//!
//! The evaluator reaches the process only through this trait. `message` is
//! the triggering message as a JSON document; `cluster` exposes a single
//! read-only lookup; `ledger` exposes read-only `findLast`/`count`.

use serde_json::Value;

/// The three read-only bindings a script may use.
pub trait Host {
    /// The triggering message, serialized (`topic`, `sender`, `receiver`,
    /// `content.text`, `content.data`, `metadata`, ...).
    fn message(&self) -> &Value;

    /// `cluster.getAgentsByRole(role)` — agent ids with the given role.
    fn agents_by_role(&self, role: &str) -> Vec<String>;

    /// `ledger.findLast(topic)` — newest message with the topic, serialized,
    /// or `null`.
    fn find_last(&self, topic: &str) -> Option<Value>;

    /// `ledger.count(topic)` — number of messages with the topic.
    fn count(&self, topic: &str) -> u64;
}

/// Fixed-data host for tests and for validating scripts against a sample
/// message without a live cluster.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub message: Value,
    pub agents: Vec<(String, String)>,
    pub history: Vec<(String, Value)>,
}

impl Host for StaticHost {
    fn message(&self) -> &Value {
        &self.message
    }

    fn agents_by_role(&self, role: &str) -> Vec<String> {
        self.agents
            .iter()
            .filter(|(_, r)| r == role)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn find_last(&self, topic: &str) -> Option<Value> {
        self.history
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, v)| v.clone())
    }

    fn count(&self, topic: &str) -> u64 {
        self.history.iter().filter(|(t, _)| t == topic).count() as u64
    }
}
