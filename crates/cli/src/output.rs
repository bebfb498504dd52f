// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal rendering helpers.

use chrono::{Local, TimeZone};
use zs_core::Message;

/// `HH:MM:SS` local time for an epoch-ms timestamp.
pub fn format_time(epoch_ms: u64) -> String {
    match Local.timestamp_millis_opt(epoch_ms as i64) {
        chrono::LocalResult::Single(t) => t.format("%H:%M:%S").to_string(),
        _ => epoch_ms.to_string(),
    }
}

/// One log line per message: time, topic, sender, and a text preview.
pub fn format_message(msg: &Message) -> String {
    let preview = msg
        .content
        .text
        .as_deref()
        .map(|t| t.lines().next().unwrap_or("").to_string())
        .or_else(|| msg.content.data.as_ref().map(summarize_data))
        .unwrap_or_default();
    format!(
        "{} {:<28} {:<22} {}",
        format_time(msg.timestamp),
        msg.topic.as_str(),
        msg.sender,
        truncate(&preview, 100)
    )
}

fn summarize_data(data: &serde_json::Value) -> String {
    match data {
        serde_json::Value::Object(map) => {
            // Lifecycle/output payloads get their most telling field.
            for key in ["event", "error", "reason", "line"] {
                if let Some(value) = map.get(key) {
                    return match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                }
            }
            data.to_string()
        }
        other => other.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
