// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blueprint data types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The resolved agent graph a cluster runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl Blueprint {
    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agents_by_role<'a, 'b>(
        &'a self,
        role: &'b str,
    ) -> impl Iterator<Item = &'a AgentSpec> + 'a
    where
        'b: 'a,
    {
        self.agents.iter().filter(move |a| a.role == role)
    }
}

/// Whether an entry is a plain agent or a nested cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Agent,
    Subcluster,
}

/// One agent definition inside a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    /// Free-form label; `implementation` and `conductor` carry runtime
    /// meaning (retry exhaustion policy and the operations watchdog).
    pub role: String,
    #[serde(default, rename = "type")]
    pub kind: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt prefix prepended to the triggering message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<TriggerSpec>,
    #[serde(default, skip_serializing_if = "Hooks::is_empty")]
    pub hooks: Hooks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_strategy: Option<String>,
    /// Wall-clock bound for one provider run, in seconds. `None` uses the
    /// engine default; `0` means infinite and is only valid on agents whose
    /// trigger action is `stop_cluster`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Embedded child blueprint; required when `type` is `subcluster`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Box<Blueprint>>,
    /// Parent topics forwarded into a sub-cluster's private bus.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forward_topics: Vec<String>,
    /// Child topics forwarded back out to the parent bus.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expose_topics: Vec<String>,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            kind: AgentKind::Agent,
            model: None,
            prompt: None,
            triggers: Vec::new(),
            hooks: Hooks::default(),
            context_strategy: None,
            timeout_secs: None,
            config: None,
            forward_topics: Vec::new(),
            expose_topics: Vec::new(),
        }
    }

    pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.hooks.on_complete = Some(hook);
        self
    }

    pub fn prompt_text(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// True when any trigger carries the `stop_cluster` action.
    pub fn stops_cluster(&self) -> bool {
        self.triggers.iter().any(|t| t.action == TriggerAction::StopCluster)
    }
}

/// What firing a trigger does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    #[default]
    ExecuteTask,
    StopCluster,
}

/// Sandboxed predicate attached to a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerLogic {
    pub script: String,
}

/// Subscription rule: topic pattern, optional predicate, action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Exact topic, `"*"`, or `"PREFIX*"`.
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<TriggerLogic>,
    #[serde(default)]
    pub action: TriggerAction,
}

impl TriggerSpec {
    pub fn on(topic: impl Into<String>) -> Self {
        Self { topic: topic.into(), logic: None, action: TriggerAction::default() }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.logic = Some(TriggerLogic { script: script.into() });
        self
    }

    pub fn stopping(mut self) -> Self {
        self.action = TriggerAction::StopCluster;
        self
    }
}

/// Agent hook set. Only `on_complete` exists today.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<CompletionHook>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.on_complete.is_none()
    }
}

/// Message published when a task run exits successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionHook {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CompletionHook {
    pub fn publish(topic: impl Into<String>) -> Self {
        Self { topic: topic.into(), text: None, data: None }
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
