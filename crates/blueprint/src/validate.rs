// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blueprint validation.
//!
//! Runs on initial load and again on every proposed post-operation topology
//! before the orchestrator mutates anything.

use crate::spec::{AgentKind, Blueprint};
use crate::template::leaked_tokens;
use thiserror::Error;
use zs_core::Topic;

/// Maximum sub-cluster nesting depth.
pub const MAX_NESTING_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlueprintError {
    #[error("invalid blueprint: {}", problems.join("; "))]
    Invalid { problems: Vec<String> },

    #[error("unknown template {name:?}")]
    UnknownTemplate { name: String },

    #[error("template is not a valid blueprint: {0}")]
    Malformed(String),
}

/// Validate a blueprint. Returns non-fatal warnings on success; collects
/// every problem into one error on failure.
pub fn validate(blueprint: &Blueprint) -> Result<Vec<String>, BlueprintError> {
    let mut problems = Vec::new();
    let mut warnings = Vec::new();
    walk(blueprint, 1, &mut problems, &mut warnings);
    if problems.is_empty() {
        for warning in &warnings {
            tracing::warn!("blueprint: {warning}");
        }
        Ok(warnings)
    } else {
        Err(BlueprintError::Invalid { problems })
    }
}

fn walk(blueprint: &Blueprint, depth: usize, problems: &mut Vec<String>, warnings: &mut Vec<String>) {
    if blueprint.agents.is_empty() {
        problems.push("blueprint has no agents".to_string());
        return;
    }

    // Unique ids.
    let mut seen = std::collections::HashSet::new();
    for agent in &blueprint.agents {
        if agent.id.is_empty() {
            problems.push("agent with empty id".to_string());
        }
        if !seen.insert(agent.id.as_str()) {
            problems.push(format!("duplicate agent id {:?}", agent.id));
        }
    }

    // Topics some agent in this blueprint produces on completion.
    let produced: std::collections::HashSet<&str> = blueprint
        .agents
        .iter()
        .filter_map(|a| a.hooks.on_complete.as_ref())
        .map(|h| h.topic.as_str())
        .collect();

    for agent in &blueprint.agents {
        for trigger in &agent.triggers {
            if trigger.topic.is_empty() {
                problems.push(format!("agent {:?} has a trigger with an empty topic", agent.id));
                continue;
            }
            // Wildcard patterns cannot be reachability-checked.
            if !trigger.topic.ends_with('*') {
                let topic = Topic::new(&trigger.topic);
                if !topic.is_reserved() && !produced.contains(trigger.topic.as_str()) {
                    warnings.push(format!(
                        "agent {:?} listens on {:?}, which no agent produces and is not reserved",
                        agent.id, trigger.topic
                    ));
                }
            }
            if let Some(logic) = &trigger.logic {
                if let Err(e) = zs_predicate::check(&logic.script) {
                    problems.push(format!(
                        "agent {:?} trigger on {:?} has an invalid script: {e}",
                        agent.id, trigger.topic
                    ));
                }
            }
        }

        // Infinite timeout is reserved for stop_cluster watchers.
        if agent.timeout_secs == Some(0) && !agent.stops_cluster() {
            problems.push(format!(
                "agent {:?} requests an infinite timeout without a stop_cluster trigger",
                agent.id
            ));
        }

        // Unresolved template tokens must not reach a live prompt.
        if let Some(prompt) = &agent.prompt {
            let leaked = leaked_tokens(prompt);
            if !leaked.is_empty() {
                problems.push(format!(
                    "agent {:?} prompt contains unresolved template tokens: {}",
                    agent.id,
                    leaked.join(", ")
                ));
            }
        }

        match agent.kind {
            AgentKind::Agent => {
                if agent.config.is_some() {
                    warnings.push(format!(
                        "agent {:?} carries an embedded config but is not a subcluster",
                        agent.id
                    ));
                }
            }
            AgentKind::Subcluster => {
                if agent.triggers.is_empty() {
                    problems.push(format!("subcluster {:?} has no triggers", agent.id));
                }
                match &agent.config {
                    None => problems.push(format!("subcluster {:?} has no config", agent.id)),
                    Some(child) if child.agents.is_empty() => {
                        problems.push(format!("subcluster {:?} has an empty config", agent.id))
                    }
                    Some(child) => {
                        if depth >= MAX_NESTING_DEPTH {
                            problems.push(format!(
                                "subcluster {:?} exceeds the nesting depth cap of {}",
                                agent.id, MAX_NESTING_DEPTH
                            ));
                        } else {
                            walk(child, depth + 1, problems, warnings);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
