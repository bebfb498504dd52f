// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster identity, lifecycle state, and isolation records.
//!
//! The full registry record (which also carries the resolved agent graph)
//! lives in the engine crate; this module holds the pure data the whole
//! workspace shares.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Sender name used for runtime-internal messages.
pub const SENDER_SYSTEM: &str = "system";
/// Sender name used for orchestrator-published messages.
pub const SENDER_ORCHESTRATOR: &str = "orchestrator";

/// Unique human-friendly cluster identifier (`cluster-<adjective>-<noun>-<n>`,
/// possibly suffixed with random hex after a collision).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id without its `cluster-` prefix, used for branch names.
    pub fn suffix(&self) -> &str {
        self.0.strip_prefix("cluster-").unwrap_or(&self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClusterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClusterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for ClusterId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ClusterId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for ClusterId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Cluster lifecycle state.
///
/// `Zombie` is never persisted: it is computed on read when the record says
/// `Running` but the recorded pid is not alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Killed,
    Failed,
    Corrupted,
    Zombie,
}

impl ClusterState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClusterState::Stopped
                | ClusterState::Killed
                | ClusterState::Failed
                | ClusterState::Corrupted
        )
    }

    /// True when the state may legally be written to the registry.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, ClusterState::Zombie)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterState::Initializing => "initializing",
            ClusterState::Running => "running",
            ClusterState::Stopping => "stopping",
            ClusterState::Stopped => "stopped",
            ClusterState::Killed => "killed",
            ClusterState::Failed => "failed",
            ClusterState::Corrupted => "corrupted",
            ClusterState::Zombie => "zombie",
        };
        write!(f, "{s}")
    }
}

/// Why a cluster failed, recorded for `resume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub failed_at_ms: u64,
}

/// Worktree-mode isolation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeRecord {
    pub path: PathBuf,
    pub branch: String,
    pub repo_root: PathBuf,
    pub work_dir: PathBuf,
}

/// Container-mode isolation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub container_id: String,
    pub image: String,
    pub work_dir: PathBuf,
    /// Per-cluster private credential/hook directory bind-mounted read-only.
    pub config_dir: PathBuf,
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
