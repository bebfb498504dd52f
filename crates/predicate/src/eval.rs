// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded predicate evaluation.

use crate::ast::Expr;
use crate::error::PredicateError;
use crate::host::Host;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Per-evaluation resource budget. Ledger-backed calls dominate cost, so
/// both a step fuel and a wall clock bound apply.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub max_steps: u32,
    pub max_wall: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self { max_steps: 10_000, max_wall: Duration::from_millis(50) }
    }
}

struct Gauge {
    steps: u32,
    deadline: Instant,
    budget: Budget,
}

impl Gauge {
    fn spend(&mut self) -> Result<(), PredicateError> {
        self.steps += 1;
        if self.steps > self.budget.max_steps || Instant::now() > self.deadline {
            return Err(PredicateError::BudgetExhausted);
        }
        Ok(())
    }
}

/// Evaluate a parsed script against the host bindings; true means the
/// trigger fires. Callers map `Err` to "did not fire" and log it.
pub fn evaluate(expr: &Expr, host: &dyn Host, budget: Budget) -> Result<bool, PredicateError> {
    let mut gauge = Gauge { steps: 0, deadline: Instant::now() + budget.max_wall, budget };
    let value = eval(expr, host, &mut gauge)?;
    Ok(truthy(&value))
}

/// JavaScript-flavored truthiness, matching what script authors expect:
/// `null`/`false`/`0`/`""` are false, everything else true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn eval(expr: &Expr, host: &dyn Host, gauge: &mut Gauge) -> Result<Value, PredicateError> {
    gauge.spend()?;
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Path { root, segments } => {
            let mut value = match root.as_str() {
                "message" => host.message().clone(),
                // Bare `cluster`/`ledger` have no data shape of their own.
                "cluster" | "ledger" => Value::Null,
                other => return Err(PredicateError::UnknownBinding { name: other.to_string() }),
            };
            for segment in segments {
                gauge.spend()?;
                value = access(&value, segment);
            }
            Ok(value)
        }

        Expr::Not(inner) => {
            let value = eval(inner, host, gauge)?;
            Ok(Value::Bool(!truthy(&value)))
        }

        Expr::And(left, right) => {
            let lv = eval(left, host, gauge)?;
            if !truthy(&lv) {
                return Ok(Value::Bool(false));
            }
            let rv = eval(right, host, gauge)?;
            Ok(Value::Bool(truthy(&rv)))
        }

        Expr::Or(left, right) => {
            let lv = eval(left, host, gauge)?;
            if truthy(&lv) {
                return Ok(Value::Bool(true));
            }
            let rv = eval(right, host, gauge)?;
            Ok(Value::Bool(truthy(&rv)))
        }

        Expr::Eq(left, right) => {
            let lv = eval(left, host, gauge)?;
            let rv = eval(right, host, gauge)?;
            Ok(Value::Bool(loose_eq(&lv, &rv)))
        }

        Expr::Ne(left, right) => {
            let lv = eval(left, host, gauge)?;
            let rv = eval(right, host, gauge)?;
            Ok(Value::Bool(!loose_eq(&lv, &rv)))
        }

        Expr::Call { target, method, args } => eval_call(target, method, args, host, gauge),
    }
}

/// Field access on a JSON value; anything missing is `null`, and `length`
/// works on strings and arrays.
fn access(value: &Value, field: &str) -> Value {
    if field == "length" {
        return match value {
            Value::String(s) => Value::from(s.chars().count() as u64),
            Value::Array(a) => Value::from(a.len() as u64),
            _ => Value::Null,
        };
    }
    match value {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().zip(y.as_f64()).map(|(x, y)| x == y).unwrap_or(false)
        }
        _ => a == b,
    }
}

fn eval_call(
    target: &Expr,
    method: &str,
    args: &[Expr],
    host: &dyn Host,
    gauge: &mut Gauge,
) -> Result<Value, PredicateError> {
    // Binding-scoped methods: cluster.* and ledger.*.
    if let Expr::Path { root, segments } = target {
        if segments.is_empty() && (root == "cluster" || root == "ledger") {
            let arg = single_string_arg(method, args, host, gauge)?;
            return match (root.as_str(), method) {
                ("cluster", "getAgentsByRole") => {
                    let agents = host.agents_by_role(&arg);
                    Ok(Value::Array(agents.into_iter().map(Value::String).collect()))
                }
                ("ledger", "findLast") => Ok(host.find_last(&arg).unwrap_or(Value::Null)),
                ("ledger", "count") => Ok(Value::from(host.count(&arg))),
                ("cluster", _) => {
                    Err(PredicateError::UnknownMethod { method: method.to_string(), target: "cluster" })
                }
                (_, _) => {
                    Err(PredicateError::UnknownMethod { method: method.to_string(), target: "ledger" })
                }
            };
        }
    }

    // Value methods.
    let value = eval(target, host, gauge)?;
    match method {
        "startsWith" => {
            let prefix = single_string_arg("startsWith", args, host, gauge)?;
            match value {
                Value::String(s) => Ok(Value::Bool(s.starts_with(&prefix))),
                _ => Ok(Value::Bool(false)),
            }
        }
        // Zero-arg accessor spelled like a field on a computed value.
        "length" if args.is_empty() => Ok(access(&value, "length")),
        _ => Err(PredicateError::UnknownMethod { method: method.to_string(), target: "value" }),
    }
}

fn single_string_arg(
    method: &str,
    args: &[Expr],
    host: &dyn Host,
    gauge: &mut Gauge,
) -> Result<String, PredicateError> {
    let method_name: &'static str = match method {
        "getAgentsByRole" => "getAgentsByRole",
        "findLast" => "findLast",
        "count" => "count",
        "startsWith" => "startsWith",
        _ => "method",
    };
    if args.len() != 1 {
        return Err(PredicateError::BadArity { method: method_name, expected: 1, got: args.len() });
    }
    match eval(&args[0], host, gauge)? {
        Value::String(s) => Ok(s),
        _ => Err(PredicateError::BadArgument { method: method_name }),
    }
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
