// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation chains: ordered topology mutations carried by
//! `CLUSTER_OPERATIONS` messages.
//!
//! The closed action set is `add_agents`, `remove_agents`, `update_agent`,
//! `publish`, and `load_config`. A chain is structurally parsed, projected
//! onto the current blueprint, and the projection validated before any
//! operation executes.

use crate::spec::{AgentSpec, Blueprint, Hooks, TriggerSpec};
use crate::template::{TemplateRef, TemplateStore};
use crate::validate::BlueprintError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field updates applied to an existing agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<TriggerSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl AgentPatch {
    pub fn apply(&self, spec: &mut AgentSpec) {
        if let Some(model) = &self.model {
            spec.model = Some(model.clone());
        }
        if let Some(prompt) = &self.prompt {
            spec.prompt = Some(prompt.clone());
        }
        if let Some(triggers) = &self.triggers {
            spec.triggers = triggers.clone();
        }
        if let Some(hooks) = &self.hooks {
            spec.hooks = hooks.clone();
        }
        if let Some(strategy) = &self.context_strategy {
            spec.context_strategy = Some(strategy.clone());
        }
        if let Some(timeout) = self.timeout_secs {
            spec.timeout_secs = Some(timeout);
        }
    }
}

/// One topology mutation. Unknown actions fail structural parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Operation {
    AddAgents {
        agents: Vec<AgentSpec>,
    },
    RemoveAgents {
        ids: Vec<String>,
    },
    UpdateAgent {
        id: String,
        #[serde(default)]
        patch: AgentPatch,
    },
    Publish {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver: Option<String>,
    },
    LoadConfig {
        config: TemplateRef,
    },
}

/// An ordered list of operations, as carried in `content.data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationChain {
    pub operations: Vec<Operation>,
}

impl OperationChain {
    /// Structural validation: every entry parses and its action is in the
    /// closed set. Returns a human-readable problem on failure.
    pub fn parse(data: &Value) -> Result<Self, String> {
        serde_json::from_value(data.clone()).map_err(|e| format!("malformed operation chain: {e}"))
    }

    /// Project the chain onto a blueprint without executing anything.
    /// `Publish` operations change no topology; `LoadConfig` contributes the
    /// resolved template's agents.
    pub fn proposed(
        &self,
        current: &Blueprint,
        templates: &TemplateStore,
    ) -> Result<Blueprint, BlueprintError> {
        let mut agents = current.agents.clone();
        for operation in &self.operations {
            match operation {
                Operation::AddAgents { agents: added } => agents.extend(added.iter().cloned()),
                Operation::RemoveAgents { ids } => {
                    agents.retain(|a| !ids.iter().any(|id| *id == a.id));
                }
                Operation::UpdateAgent { id, patch } => {
                    let Some(spec) = agents.iter_mut().find(|a| a.id == *id) else {
                        return Err(BlueprintError::Invalid {
                            problems: vec![format!("update_agent targets unknown agent {id:?}")],
                        });
                    };
                    patch.apply(spec);
                }
                Operation::Publish { .. } => {}
                Operation::LoadConfig { config } => {
                    let resolved = templates.resolve(config)?;
                    agents.extend(resolved.agents);
                }
            }
        }
        Ok(Blueprint { agents })
    }
}

#[cfg(test)]
#[path = "operations_tests.rs"]
mod tests;
