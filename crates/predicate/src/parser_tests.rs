// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_paths() {
    let expr = parse("message.content.data.approved").unwrap();
    assert_eq!(
        expr,
        Expr::Path {
            root: "message".into(),
            segments: vec!["content".into(), "data".into(), "approved".into()],
        }
    );
}

#[test]
fn parses_equality_over_path_and_literal() {
    let expr = parse("message.topic == 'PLAN_READY'").unwrap();
    match expr {
        Expr::Eq(left, right) => {
            assert!(matches!(*left, Expr::Path { .. }));
            assert_eq!(*right, Expr::Literal(serde_json::json!("PLAN_READY")));
        }
        other => panic!("expected Eq, got {other:?}"),
    }
}

#[test]
fn and_binds_tighter_than_or() {
    let expr = parse("a || b && c").unwrap();
    match expr {
        Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
        other => panic!("expected Or at the top, got {other:?}"),
    }
}

#[test]
fn parens_override_precedence() {
    let expr = parse("(a || b) && c").unwrap();
    assert!(matches!(expr, Expr::And(_, _)));
}

#[test]
fn not_applies_to_the_nearest_operand() {
    let expr = parse("!a && b").unwrap();
    match expr {
        Expr::And(left, _) => assert!(matches!(*left, Expr::Not(_))),
        other => panic!("expected And, got {other:?}"),
    }
}

#[test]
fn parses_method_calls_with_arguments() {
    let expr = parse("cluster.getAgentsByRole('validator').length != 0").unwrap();
    match expr {
        Expr::Ne(left, _) => match *left {
            Expr::Call { target, method, args } => {
                assert_eq!(method, "length");
                assert!(args.is_empty());
                assert!(matches!(*target, Expr::Call { .. }));
            }
            other => panic!("expected Call, got {other:?}"),
        },
        other => panic!("expected Ne, got {other:?}"),
    }
}

#[test]
fn parses_starts_with() {
    let expr = parse("message.topic.startsWith('CLUSTER_')").unwrap();
    assert!(matches!(expr, Expr::Call { .. }));
}

#[yare::parameterized(
    trailing       = { "a &&" },
    dangling_dot   = { "message." },
    unclosed_paren = { "(a || b" },
    unclosed_call  = { "f.g(a" },
    double_expr    = { "a b" },
    empty          = { "" },
)]
fn rejects_malformed_scripts(script: &str) {
    assert!(parse(script).is_err());
}
