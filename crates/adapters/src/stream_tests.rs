// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn events_serialize_with_snake_case_type_tags() {
    let event = StreamEvent::ToolCall {
        name: "Bash".into(),
        id: Some("tu_1".into()),
        input: Some(json!({"command": "ls"})),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "tool_call");
    assert_eq!(value["name"], "Bash");
}

#[yare::parameterized(
    tool_start  = { StreamEvent::ToolStart { name: "Read".into(), id: Some("a".into()) }, Some("a") },
    tool_result = { StreamEvent::ToolResult { id: Some("b".into()), output: None, is_error: false }, Some("b") },
    text        = { StreamEvent::Text { text: "x".into() }, None },
    block_end   = { StreamEvent::BlockEnd, None },
)]
fn tool_id_extraction(event: StreamEvent, expected: Option<&str>) {
    assert_eq!(event.tool_id(), expected);
}

#[test]
fn usage_only_on_result() {
    let result = StreamEvent::Result {
        usage: UsageSample { input_tokens: 5, ..Default::default() },
        text: None,
        is_error: false,
    };
    assert_eq!(result.usage().unwrap().input_tokens, 5);
    assert!(StreamEvent::BlockEnd.usage().is_none());
}

#[test]
fn roundtrip_through_json() {
    let events = vec![
        StreamEvent::ThinkingStart,
        StreamEvent::Thinking { text: "…".into() },
        StreamEvent::Text { text: "hello".into() },
        StreamEvent::BlockEnd,
    ];
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
