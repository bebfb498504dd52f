// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message topics.
//!
//! Topics are short uppercase identifiers from an open vocabulary. The
//! runtime reserves a fixed set it emits and consumes itself; everything
//! else is agent-defined and flows through untouched.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A message topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(SmolStr);

impl Topic {
    /// Bootstrap message carrying the user-supplied issue or prompt.
    pub const ISSUE_OPENED: &'static str = "ISSUE_OPENED";
    /// One parsed provider stream event.
    pub const AGENT_OUTPUT: &'static str = "AGENT_OUTPUT";
    /// Agent lifecycle transitions (see [`crate::payload::LifecycleEvent`]).
    pub const AGENT_LIFECYCLE: &'static str = "AGENT_LIFECYCLE";
    /// A provider task failed.
    pub const AGENT_ERROR: &'static str = "AGENT_ERROR";
    /// Per-task token accounting.
    pub const TOKEN_USAGE: &'static str = "TOKEN_USAGE";
    pub const PLAN_READY: &'static str = "PLAN_READY";
    pub const IMPLEMENTATION_READY: &'static str = "IMPLEMENTATION_READY";
    pub const VALIDATION_RESULT: &'static str = "VALIDATION_RESULT";
    pub const CONDUCTOR_ESCALATE: &'static str = "CONDUCTOR_ESCALATE";
    /// Ordered list of topology mutations.
    pub const CLUSTER_OPERATIONS: &'static str = "CLUSTER_OPERATIONS";
    pub const CLUSTER_OPERATIONS_SUCCESS: &'static str = "CLUSTER_OPERATIONS_SUCCESS";
    pub const CLUSTER_OPERATIONS_FAILED: &'static str = "CLUSTER_OPERATIONS_FAILED";
    pub const CLUSTER_OPERATIONS_VALIDATION_FAILED: &'static str =
        "CLUSTER_OPERATIONS_VALIDATION_FAILED";
    pub const CLUSTER_COMPLETE: &'static str = "CLUSTER_COMPLETE";
    pub const CLUSTER_FAILED: &'static str = "CLUSTER_FAILED";
    pub const PR_CREATED: &'static str = "PR_CREATED";

    /// Topics the `resume` flow treats as workflow-triggering: the last one
    /// of these decides which agents wake up again.
    pub const WORKFLOW_TRIGGERS: [&'static str; 5] = [
        Self::ISSUE_OPENED,
        Self::PLAN_READY,
        Self::IMPLEMENTATION_READY,
        Self::VALIDATION_RESULT,
        Self::CONDUCTOR_ESCALATE,
    ];

    /// The full reserved set the runtime emits or consumes.
    pub const RESERVED: [&'static str; 16] = [
        Self::ISSUE_OPENED,
        Self::AGENT_OUTPUT,
        Self::AGENT_LIFECYCLE,
        Self::AGENT_ERROR,
        Self::TOKEN_USAGE,
        Self::PLAN_READY,
        Self::IMPLEMENTATION_READY,
        Self::VALIDATION_RESULT,
        Self::CONDUCTOR_ESCALATE,
        Self::CLUSTER_OPERATIONS,
        Self::CLUSTER_OPERATIONS_SUCCESS,
        Self::CLUSTER_OPERATIONS_FAILED,
        Self::CLUSTER_OPERATIONS_VALIDATION_FAILED,
        Self::CLUSTER_COMPLETE,
        Self::CLUSTER_FAILED,
        Self::PR_CREATED,
    ];

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_reserved(&self) -> bool {
        Self::RESERVED.contains(&self.as_str())
    }

    pub fn is_workflow_trigger(&self) -> bool {
        Self::WORKFLOW_TRIGGERS.contains(&self.as_str())
    }

    /// Match against a trigger pattern: exact, `"*"`, or `"PREFIX*"`.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return self.as_str().starts_with(prefix);
        }
        self.as_str() == pattern
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for Topic {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Topic {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl std::borrow::Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
