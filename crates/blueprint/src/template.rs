// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named blueprint templates with `{{param}}` substitution.
//!
//! Substitution touches string fields only and replaces `{{identifier}}`
//! tokens — no path expressions, no nesting. A missing parameter leaves the
//! token in place; the validator rejects blueprints where a token leaked
//! into a prompt.

use crate::spec::Blueprint;
use crate::validate::BlueprintError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// `{{identifier}}` — bare word tokens only.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("constant regex pattern is valid")
});

/// Tokens still present in a string after resolution.
pub fn leaked_tokens(s: &str) -> Vec<String> {
    TOKEN_PATTERN.captures_iter(s).map(|c| c[1].to_string()).collect()
}

/// Substitute `{{token}}`s in one string. Unknown tokens stay in place.
fn substitute(s: &str, params: &HashMap<String, String>) -> String {
    TOKEN_PATTERN
        .replace_all(s, |caps: &regex::Captures| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .to_string()
}

/// Walk a JSON document substituting tokens in every string leaf.
/// Non-string values pass through unchanged.
fn substitute_value(value: &Value, params: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, params)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute_value(v, params)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), substitute_value(v, params))).collect(),
        ),
        other => other.clone(),
    }
}

/// Reference to a template: a bare name, or a base plus parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum TemplateRef {
    Name(String),
    Parameterized {
        base: String,
        #[serde(default)]
        params: HashMap<String, String>,
    },
}

impl TemplateRef {
    pub fn base(&self) -> &str {
        match self {
            TemplateRef::Name(name) => name,
            TemplateRef::Parameterized { base, .. } => base,
        }
    }

    pub fn params(&self) -> HashMap<String, String> {
        match self {
            TemplateRef::Name(_) => HashMap::new(),
            TemplateRef::Parameterized { params, .. } => params.clone(),
        }
    }
}

/// Built-in minimal pipeline: plan → implement → stop.
const SOLO_TEMPLATE: &str = r#"{
    "agents": [
        {
            "id": "implementer",
            "role": "implementation",
            "prompt": "Implement the task described in the triggering message.",
            "triggers": [{"topic": "ISSUE_OPENED"}],
            "hooks": {"on_complete": {"topic": "IMPLEMENTATION_READY"}}
        },
        {
            "id": "completion-orchestrator",
            "role": "orchestration",
            "timeout_secs": 0,
            "triggers": [{"topic": "IMPLEMENTATION_READY", "action": "stop_cluster"}]
        }
    ]
}"#;

/// Built-in three-stage pipeline with validation feedback.
const STANDARD_TEMPLATE: &str = r#"{
    "agents": [
        {
            "id": "planner",
            "role": "planning",
            "prompt": "Produce an implementation plan for the task.",
            "triggers": [{"topic": "ISSUE_OPENED"}],
            "hooks": {"on_complete": {"topic": "PLAN_READY"}}
        },
        {
            "id": "implementer",
            "role": "implementation",
            "prompt": "Implement the plan from the triggering message.",
            "triggers": [
                {"topic": "PLAN_READY"},
                {
                    "topic": "VALIDATION_RESULT",
                    "logic": {"script": "!message.content.data.approved"}
                }
            ],
            "hooks": {"on_complete": {"topic": "IMPLEMENTATION_READY"}}
        },
        {
            "id": "validator",
            "role": "validation",
            "prompt": "Validate the implementation against the plan.",
            "triggers": [{"topic": "IMPLEMENTATION_READY"}],
            "hooks": {"on_complete": {"topic": "VALIDATION_RESULT"}}
        },
        {
            "id": "completion-orchestrator",
            "role": "orchestration",
            "timeout_secs": 0,
            "triggers": [
                {
                    "topic": "VALIDATION_RESULT",
                    "logic": {"script": "message.content.data.approved"},
                    "action": "stop_cluster"
                }
            ]
        }
    ]
}"#;

/// Registry of named templates: the built-ins plus anything loaded from a
/// templates directory (`<name>.json`).
pub struct TemplateStore {
    templates: HashMap<String, Value>,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore {
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        for (name, body) in [("solo", SOLO_TEMPLATE), ("standard", STANDARD_TEMPLATE)] {
            match serde_json::from_str(body) {
                Ok(value) => {
                    templates.insert(name.to_string(), value);
                }
                Err(e) => unreachable!("builtin template {name} must parse: {e}"),
            }
        }
        Self { templates }
    }

    /// Register every `*.json` file in a directory, keyed by file stem.
    /// Files that fail to parse are skipped with a warning.
    pub fn load_dir(&mut self, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|text| {
                serde_json::from_str::<Value>(&text).map_err(|e| e.to_string())
            }) {
                Ok(value) => {
                    self.templates.insert(name.to_string(), value);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable template");
                }
            }
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, template: Value) {
        self.templates.insert(name.into(), template);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a template reference into a blueprint. The caller still runs
    /// the validator on the result.
    pub fn resolve(&self, template: &TemplateRef) -> Result<Blueprint, BlueprintError> {
        let body = self.templates.get(template.base()).ok_or_else(|| {
            BlueprintError::UnknownTemplate { name: template.base().to_string() }
        })?;
        let resolved = substitute_value(body, &template.params());
        serde_json::from_value(resolved).map_err(|e| BlueprintError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
