// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared on-disk cluster registry.
//!
//! One `registry.json` per state dir, guarded by a lock file. Any process
//! may read; a record is written back only by its owning process (matching
//! pid) or by an explicit stop/kill acting on someone else's cluster.
//! Crashed writers leave a stale lock file; writers older than the stale
//! threshold are forcibly displaced.

use crate::error::RegistryError;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use zs_blueprint::Blueprint;
use zs_core::{ClusterId, ClusterState, ContainerRecord, FailureInfo, WorktreeRecord};

/// Locks older than this are considered abandoned and removed.
const STALE_LOCK_AGE: Duration = Duration::from_secs(10);
const LOCK_ATTEMPTS: u32 = 50;
const LOCK_BACKOFF_BASE_MS: u64 = 5;

/// One cluster's persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub state: ClusterState,
    #[serde(default)]
    pub created_at_ms: u64,
    /// Owning process; cleared on stop/kill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_info: Option<FailureInfo>,
    #[serde(default)]
    pub auto_pr: bool,
    /// When false, downstream agents omit "Closes #N" references because
    /// the git remote and the issue tracker live on different hosts.
    #[serde(default = "default_true")]
    pub link_issue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<ContainerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<WorktreeRecord>,
    /// The resolved agent graph, persisted for resume.
    #[serde(default)]
    pub blueprint: Blueprint,
}

fn default_true() -> bool {
    true
}

impl ClusterRecord {
    pub fn new(id: ClusterId, blueprint: Blueprint, created_at_ms: u64) -> Self {
        Self {
            id,
            state: ClusterState::Initializing,
            created_at_ms,
            pid: Some(std::process::id()),
            failure_info: None,
            auto_pr: false,
            link_issue: true,
            model_override: None,
            issue_provider: None,
            git_platform: None,
            isolation: None,
            worktree: None,
            blueprint,
        }
    }

    /// The observable state: `running` with a dead (or missing) pid reads
    /// as `zombie`.
    pub fn effective_state(&self) -> ClusterState {
        if self.state == ClusterState::Running {
            match self.pid {
                Some(pid) if pid_alive(pid) => ClusterState::Running,
                _ => ClusterState::Zombie,
            }
        } else {
            self.state
        }
    }

    pub fn owned_by_this_process(&self) -> bool {
        self.pid == Some(std::process::id())
    }
}

/// True when `pid` refers to a live process (signal 0 probe).
pub fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

/// File-locked registry over `registry.json`.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    lock_path: PathBuf,
}

struct LockGuard {
    file: std::fs::File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // The file itself stays behind; a crashed holder's flock is released
        // by the OS, and hung holders are displaced via the stale threshold.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl Registry {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("registry.json"),
            lock_path: state_dir.join("registry.json.lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the advisory lock: bounded retries with jittered backoff,
    /// displacing locks older than the stale threshold.
    fn acquire_lock(&self) -> Result<LockGuard, RegistryError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        for attempt in 0..LOCK_ATTEMPTS {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&self.lock_path)
                .map_err(|e| self.io_err(e))?;
            if file.try_lock_exclusive().is_ok() {
                // Refresh mtime so other processes can age us accurately.
                let _ = file.set_len(0);
                return Ok(LockGuard { file });
            }

            if self.lock_is_stale() {
                tracing::warn!(path = %self.lock_path.display(), "removing stale registry lock");
                let _ = std::fs::remove_file(&self.lock_path);
                continue;
            }

            std::thread::sleep(Duration::from_millis(
                LOCK_BACKOFF_BASE_MS * (attempt as u64 % 8 + 1) + jitter_ms(),
            ));
        }
        Err(RegistryError::LockContention {
            path: self.lock_path.display().to_string(),
            attempts: LOCK_ATTEMPTS,
        })
    }

    fn lock_is_stale(&self) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.lock_path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        SystemTime::now().duration_since(modified).map(|age| age > STALE_LOCK_AGE).unwrap_or(false)
    }

    fn io_err(&self, source: std::io::Error) -> RegistryError {
        RegistryError::Io { path: self.path.display().to_string(), source }
    }

    fn read_unlocked(&self) -> Result<HashMap<String, ClusterRecord>, RegistryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(body) if body.trim().is_empty() => Ok(HashMap::new()),
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn write_unlocked(&self, map: &HashMap<String, ClusterRecord>) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let body = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    /// Read every record under the lock.
    pub fn load(&self) -> Result<HashMap<String, ClusterRecord>, RegistryError> {
        let _guard = self.acquire_lock()?;
        self.read_unlocked()
    }

    /// Write one record back, merging with the current file contents.
    ///
    /// The ownership rule applies unless `force` (explicit stop/kill from
    /// another process): a record owned by a different live process is not
    /// overwritten. `killed` records are deleted rather than stored.
    pub fn persist(&self, record: &ClusterRecord, force: bool) -> Result<(), RegistryError> {
        let _guard = self.acquire_lock()?;
        let mut map = self.read_unlocked()?;

        if !force {
            if let Some(existing) = map.get(record.id.as_str()) {
                let foreign_owner = existing
                    .pid
                    .map(|pid| pid != std::process::id() && pid_alive(pid))
                    .unwrap_or(false);
                if foreign_owner {
                    tracing::warn!(
                        cluster = %record.id,
                        "skipping registry write: record owned by another live process"
                    );
                    return Ok(());
                }
            }
        }

        if record.state == ClusterState::Killed {
            map.remove(record.id.as_str());
        } else {
            map.insert(record.id.as_str().to_string(), record.clone());
        }
        self.write_unlocked(&map)
    }

    /// Delete a record outright.
    pub fn remove(&self, id: &ClusterId) -> Result<(), RegistryError> {
        let _guard = self.acquire_lock()?;
        let mut map = self.read_unlocked()?;
        if map.remove(id.as_str()).is_some() {
            self.write_unlocked(&map)?;
        }
        Ok(())
    }

    /// Read all records, pruning entries whose ledger file has vanished.
    /// `ledger_path` maps a cluster id to its expected ledger file.
    pub fn load_pruned(
        &self,
        ledger_path: impl Fn(&str) -> PathBuf,
    ) -> Result<HashMap<String, ClusterRecord>, RegistryError> {
        let _guard = self.acquire_lock()?;
        let mut map = self.read_unlocked()?;
        let before = map.len();
        map.retain(|id, _| ledger_path(id).exists());
        if map.len() != before {
            tracing::info!(pruned = before - map.len(), "pruned registry entries with missing ledgers");
            self.write_unlocked(&map)?;
        }
        Ok(map)
    }
}

fn jitter_ms() -> u64 {
    // Randomized backoff spread derived from a nanoid draw.
    nanoid::nanoid!(2).bytes().fold(0u64, |acc, b| acc.wrapping_add(b as u64)) % 20
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
