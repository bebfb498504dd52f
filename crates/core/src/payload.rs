// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed payloads for the reserved topics.
//!
//! `content.data` is an opaque JSON blob on the wire. Reserved topics carry
//! one of the structs below: parsed on read with [`FromData::from_data`],
//! serialized on write with [`FromData::to_data`]. Unknown topics keep the
//! raw `serde_json::Value`.

use crate::message::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parse-on-read / serialize-on-write glue shared by all typed payloads.
pub trait FromData: Sized + Serialize + DeserializeOwned {
    fn from_data(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    fn from_message(msg: &Message) -> Option<Self> {
        msg.content.data.as_ref().and_then(Self::from_data)
    }

    fn to_data(&self) -> Value {
        // Serialization of these plain structs cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Lifecycle transitions published under `AGENT_LIFECYCLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    Started,
    Stopped,
    TaskStarted,
    TaskIdAssigned,
    ProcessSpawned,
    TaskCompleted,
    TaskFailed,
    AgentStaleWarning,
}

/// Payload of `AGENT_LIFECYCLE` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePayload {
    pub event: LifecycleEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_since_last_output_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

impl LifecyclePayload {
    pub fn new(event: LifecycleEvent) -> Self {
        Self {
            event,
            agent: None,
            triggers: Vec::new(),
            triggered_by: None,
            iteration: None,
            model: None,
            task_id: None,
            pid: None,
            time_since_last_output_ms: None,
            analysis: None,
        }
    }
}

impl FromData for LifecyclePayload {}

/// Payload of `TOKEN_USAGE` messages, one per completed task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsagePayload {
    pub role: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
}

impl TokenUsagePayload {
    /// Accumulate another sample into this bucket.
    pub fn add(&mut self, other: &TokenUsagePayload) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.total_cost_usd += other.total_cost_usd;
    }
}

impl FromData for TokenUsagePayload {}

/// Payload of `AGENT_ERROR` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentErrorPayload {
    pub attempts: u32,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl FromData for AgentErrorPayload {}

/// One checked acceptance criterion inside a validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionResult {
    pub criterion: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Payload of `VALIDATION_RESULT` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResultPayload {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria_results: Vec<CriterionResult>,
}

impl FromData for ValidationResultPayload {}

/// Payload of `AGENT_OUTPUT` messages: one parsed provider stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPayload {
    /// The parsed semantic event (`{type: text|tool_call|result|...}`).
    pub line: Value,
    pub provider: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub iteration: u32,
}

impl FromData for OutputPayload {}

/// Payload of the bootstrap `ISSUE_OPENED` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl FromData for IssuePayload {}

/// Payload of `CLUSTER_FAILED` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FromData for FailurePayload {}

/// What an issue fetcher hands the orchestrator; becomes one `ISSUE_OPENED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueInput {
    pub number: u64,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl IssueInput {
    /// A synthetic issue wrapping a raw prompt or file content.
    pub fn from_prompt(text: impl Into<String>) -> Self {
        let body = text.into();
        let title = body.lines().next().unwrap_or("task").chars().take(80).collect();
        Self { number: 0, title, body, context: String::new(), url: None }
    }

    /// The text published on the bootstrap message.
    pub fn render(&self) -> String {
        if self.context.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.body, self.context)
        }
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
