// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semantic events parsed from provider output streams.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counts and cost attached to a `result` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSample {
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

/// One semantic event from a provider's stdout stream.
///
/// Providers emit vendor-specific framing; the adapter's `parse_event`
/// normalizes each line into zero or more of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    ThinkingStart,
    ToolStart {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ToolCall {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    ToolInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        fragment: String,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default)]
        is_error: bool,
    },
    Result {
        #[serde(default)]
        usage: UsageSample,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    BlockEnd,
}

impl StreamEvent {
    /// The tool-call id this event belongs to, if any. Used to pair calls
    /// with their results in stream order.
    pub fn tool_id(&self) -> Option<&str> {
        match self {
            StreamEvent::ToolStart { id, .. }
            | StreamEvent::ToolCall { id, .. }
            | StreamEvent::ToolInput { id, .. }
            | StreamEvent::ToolResult { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    pub fn usage(&self) -> Option<&UsageSample> {
        match self {
            StreamEvent::Result { usage, .. } => Some(usage),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
