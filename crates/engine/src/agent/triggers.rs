// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger matching and the live predicate host.

use crate::agent::AgentDeps;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use zs_adapters::{CommandRunner, Provider};
use zs_blueprint::{AgentSpec, Blueprint, TriggerSpec};
use zs_core::{Clock, Message};
use zs_ledger::MessageBus;
use zs_predicate::{Budget, Host};

/// Predicate bindings backed by the live cluster: the triggering message,
/// the shared blueprint (for `getAgentsByRole`), and the ledger (read-only
/// `findLast`/`count`).
pub struct LiveHost<C: Clock> {
    message: Value,
    blueprint: Arc<Mutex<Blueprint>>,
    bus: MessageBus<C>,
}

impl<C: Clock> LiveHost<C> {
    pub fn new(message: &Message, blueprint: Arc<Mutex<Blueprint>>, bus: MessageBus<C>) -> Self {
        Self {
            message: serde_json::to_value(message).unwrap_or(Value::Null),
            blueprint,
            bus,
        }
    }
}

impl<C: Clock> Host for LiveHost<C> {
    fn message(&self) -> &Value {
        &self.message
    }

    fn agents_by_role(&self, role: &str) -> Vec<String> {
        self.blueprint.lock().agents_by_role(role).map(|a| a.id.clone()).collect()
    }

    fn find_last(&self, topic: &str) -> Option<Value> {
        match self.bus.find_last(self.bus.criteria().topic(topic)) {
            Ok(found) => found.and_then(|msg| serde_json::to_value(msg).ok()),
            Err(e) => {
                tracing::debug!(error = %e, "predicate findLast query failed");
                None
            }
        }
    }

    fn count(&self, topic: &str) -> u64 {
        match self.bus.ledger().count(&self.bus.criteria().topic(topic)) {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(error = %e, "predicate count query failed");
                0
            }
        }
    }
}

/// Find the first trigger that fires on `message`: topic pattern matches
/// and, when a script is present, it evaluates truthy. Script failures are
/// logged and treated as "did not fire".
pub(crate) fn select_trigger<'a, P, R, C>(
    spec: &'a AgentSpec,
    message: &Message,
    deps: &AgentDeps<P, R, C>,
) -> Option<&'a TriggerSpec>
where
    P: Provider,
    R: CommandRunner,
    C: Clock,
{
    for trigger in &spec.triggers {
        if !message.topic.matches(&trigger.topic) {
            continue;
        }
        let Some(logic) = &trigger.logic else {
            return Some(trigger);
        };

        let expr = match zs_predicate::parse(&logic.script) {
            Ok(expr) => expr,
            Err(e) => {
                tracing::warn!(
                    agent = %spec.id,
                    topic = %trigger.topic,
                    error = %e,
                    "trigger script failed to parse; not firing"
                );
                continue;
            }
        };
        let host = LiveHost::new(message, Arc::clone(&deps.blueprint), deps.bus.clone());
        match zs_predicate::evaluate(&expr, &host, Budget::default()) {
            Ok(true) => return Some(trigger),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    agent = %spec.id,
                    topic = %trigger.topic,
                    error = %e,
                    "trigger script failed to evaluate; not firing"
                );
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "triggers_tests.rs"]
mod tests;
