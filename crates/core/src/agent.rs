// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runtime state.
//!
//! The static definition of an agent (role, triggers, hooks) lives in the
//! blueprint crate; this is the mutable side an agent wrapper tracks while
//! running, restored best-effort on reload.

use crate::id::TaskId;
use serde::{Deserialize, Serialize};

/// What an agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Idle,
    ExecutingTask,
    Stopped,
}

impl AgentPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, AgentPhase::ExecutingTask)
    }
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentPhase::Idle => "idle",
            AgentPhase::ExecutingTask => "executing_task",
            AgentPhase::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one agent's runtime state, as returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub role: String,
    pub phase: AgentPhase,
    /// Number of task runs so far.
    #[serde(default)]
    pub iteration: u32,
    /// Id of the live (or last) task execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
    /// Pid of the provider subprocess while executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentStatus {
    pub fn idle(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            phase: AgentPhase::Idle,
            iteration: 0,
            current_task_id: None,
            process_pid: None,
            model: None,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
