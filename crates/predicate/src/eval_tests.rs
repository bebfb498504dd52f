// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::host::StaticHost;
use crate::parser::parse;
use serde_json::json;

fn host() -> StaticHost {
    StaticHost {
        message: json!({
            "topic": "VALIDATION_RESULT",
            "sender": "validator",
            "content": {
                "text": "done",
                "data": {"approved": true, "issues": []}
            }
        }),
        agents: vec![
            ("validator".to_string(), "validation".to_string()),
            ("impl-1".to_string(), "implementation".to_string()),
            ("impl-2".to_string(), "implementation".to_string()),
        ],
        history: vec![
            ("AGENT_ERROR".to_string(), json!({"sender": "impl-1"})),
            ("PLAN_READY".to_string(), json!({"sender": "planner", "topic": "PLAN_READY"})),
        ],
    }
}

fn run(script: &str) -> Result<bool, PredicateError> {
    let expr = parse(script)?;
    evaluate(&expr, &host(), Budget::default())
}

#[yare::parameterized(
    topic_eq        = { "message.topic == 'VALIDATION_RESULT'", true },
    topic_ne        = { "message.topic != 'VALIDATION_RESULT'", false },
    nested_field    = { "message.content.data.approved", true },
    missing_field   = { "message.content.data.nope", false },
    missing_is_null = { "message.content.data.nope == null", true },
    not_missing     = { "!message.content.data.nope", true },
    and_short       = { "false && message.boom.boom", false },
    or_short        = { "message.topic == 'VALIDATION_RESULT' || message.boom", true },
    starts_with_hit = { "message.topic.startsWith('VALIDATION')", true },
    starts_with_miss = { "message.topic.startsWith('CLUSTER')", false },
    empty_array_len = { "message.content.data.issues.length == 0", true },
    text_len        = { "message.content.text.length == 4", true },
    agents_by_role  = { "cluster.getAgentsByRole('implementation').length == 2", true },
    agents_none     = { "cluster.getAgentsByRole('ghost').length == 0", true },
    ledger_count    = { "ledger.count('AGENT_ERROR') == 1", true },
    ledger_count_0  = { "ledger.count('NOPE') == 0", true },
    find_last_field = { "ledger.findLast('PLAN_READY').sender == 'planner'", true },
    find_last_null  = { "ledger.findLast('NOPE') == null", true },
    number_eq       = { "2 == 2.0", true },
)]
fn scripts(script: &str, expected: bool) {
    assert_eq!(run(script).unwrap(), expected, "script: {script}");
}

#[test]
fn unknown_binding_is_an_error_not_a_crash() {
    assert!(matches!(
        run("process.env == null"),
        Err(PredicateError::UnknownBinding { .. })
    ));
    assert!(matches!(
        run("require('fs')"),
        Err(PredicateError::UnknownBinding { .. })
    ));
}

#[test]
fn unknown_methods_are_rejected() {
    assert!(matches!(
        run("ledger.append('X')"),
        Err(PredicateError::UnknownMethod { .. })
    ));
    assert!(matches!(
        run("cluster.stop('now')"),
        Err(PredicateError::UnknownMethod { .. })
    ));
}

#[test]
fn arity_and_argument_types_are_checked() {
    assert!(matches!(run("ledger.count()"), Err(PredicateError::BadArity { .. })));
    assert!(matches!(run("ledger.count(1)"), Err(PredicateError::BadArgument { .. })));
}

#[test]
fn fuel_budget_stops_pathological_scripts() {
    // Deep chain of field accesses exceeds a tiny step budget.
    let mut script = String::from("message");
    for _ in 0..100 {
        script.push_str(".a");
    }
    let expr = parse(&script).unwrap();
    let result = evaluate(
        &expr,
        &host(),
        Budget { max_steps: 10, max_wall: std::time::Duration::from_secs(1) },
    );
    assert_eq!(result, Err(PredicateError::BudgetExhausted));
}

#[yare::parameterized(
    null_false   = { json!(null), false },
    zero_false   = { json!(0), false },
    num_true     = { json!(0.5), true },
    empty_str    = { json!(""), false },
    str_true     = { json!("x"), true },
    empty_array  = { json!([]), true },
    object       = { json!({}), true },
)]
fn truthiness(value: serde_json::Value, expected: bool) {
    assert_eq!(truthy(&value), expected);
}
