// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude Code CLI provider.
//!
//! Invokes `claude -p <prompt> --output-format stream-json` and maps the
//! stream-json frames onto [`StreamEvent`]s. Frames it does not recognize
//! degrade to `Text` events so nothing silently disappears from the log.

use crate::provider::{Provider, ProviderCommand, ProviderOpts};
use crate::stream::{StreamEvent, UsageSample};
use serde_json::Value;

/// Default binary name; override with `ZEROSHOT_CLAUDE_BIN`.
const DEFAULT_BINARY: &str = "claude";

#[derive(Debug, Clone, Default)]
pub struct ClaudeProvider;

impl ClaudeProvider {
    pub fn new() -> Self {
        Self
    }

    fn binary() -> String {
        std::env::var("ZEROSHOT_CLAUDE_BIN").unwrap_or_else(|_| DEFAULT_BINARY.to_string())
    }
}

impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    fn build_command(&self, prompt: &str, opts: &ProviderOpts) -> ProviderCommand {
        let mut args = vec![
            "-p".to_string(),
            prompt.to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if let Some(model) = &opts.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        let mut env = opts.env.clone();
        // Nested sessions otherwise refuse to start.
        env.insert("CLAUDE_CODE_ENTRYPOINT".to_string(), "cli".to_string());
        ProviderCommand { binary: Self::binary(), args, env }
    }

    fn parse_event(&self, line: &str) -> Vec<StreamEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let Ok(frame) = serde_json::from_str::<Value>(trimmed) else {
            return vec![StreamEvent::Text { text: trimmed.to_string() }];
        };

        match frame.get("type").and_then(Value::as_str) {
            Some("assistant") => parse_content_blocks(&frame, BlockSide::Assistant),
            Some("user") => parse_content_blocks(&frame, BlockSide::User),
            Some("result") => {
                let usage = frame
                    .get("usage")
                    .map(parse_usage)
                    .unwrap_or_default()
                    .with_cost(frame.get("total_cost_usd").and_then(Value::as_f64));
                vec![StreamEvent::Result {
                    usage,
                    text: frame.get("result").and_then(Value::as_str).map(String::from),
                    is_error: frame.get("is_error").and_then(Value::as_bool).unwrap_or(false),
                }]
            }
            // Init/system frames carry no agent-visible content.
            Some("system") => Vec::new(),
            _ => vec![StreamEvent::Text { text: trimmed.to_string() }],
        }
    }
}

enum BlockSide {
    Assistant,
    User,
}

fn parse_content_blocks(frame: &Value, side: BlockSide) -> Vec<StreamEvent> {
    let Some(blocks) = frame
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    events.push(StreamEvent::Text { text: text.to_string() });
                }
            }
            Some("thinking") => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    events.push(StreamEvent::Thinking { text: text.to_string() });
                }
            }
            Some("tool_use") => {
                events.push(StreamEvent::ToolCall {
                    name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    id: block.get("id").and_then(Value::as_str).map(String::from),
                    input: block.get("input").cloned(),
                });
            }
            Some("tool_result") => {
                if matches!(side, BlockSide::User) {
                    events.push(StreamEvent::ToolResult {
                        id: block.get("tool_use_id").and_then(Value::as_str).map(String::from),
                        output: block.get("content").cloned(),
                        is_error: block
                            .get("is_error")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    });
                }
            }
            _ => {}
        }
    }
    events
}

fn parse_usage(usage: &Value) -> UsageSample {
    let get = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    UsageSample {
        input_tokens: get("input_tokens"),
        output_tokens: get("output_tokens"),
        cache_read_input_tokens: get("cache_read_input_tokens"),
        cache_creation_input_tokens: get("cache_creation_input_tokens"),
        total_cost_usd: 0.0,
    }
}

impl UsageSample {
    fn with_cost(mut self, cost: Option<f64>) -> Self {
        if let Some(cost) = cost {
            self.total_cost_usd = cost;
        }
        self
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
