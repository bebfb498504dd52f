// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! All paths and durations are explicit here so tests can construct a fully
//! isolated engine (fresh storage dir, tight watchdogs) without touching
//! process-global settings.

use crate::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `registry.json` and per-cluster ledgers.
    pub state_dir: PathBuf,
    /// Single-shot timer armed when a conductor completes without an
    /// operation chain.
    pub conductor_watchdog: Duration,
    /// Silence threshold before an `AGENT_STALE_WARNING` is published.
    pub stale_after: Duration,
    /// Default wall-clock bound for one provider task.
    pub default_task_timeout: Duration,
    /// Upper bound on waiting for a cluster's init barrier during stop.
    pub stop_barrier_timeout: Duration,
}

impl EngineConfig {
    /// Production defaults rooted at the resolved state directory.
    pub fn from_env() -> Self {
        Self {
            state_dir: env::state_dir(),
            conductor_watchdog: Duration::from_secs(30),
            stale_after: env::stale_after(),
            default_task_timeout: Duration::from_secs(30 * 60),
            stop_barrier_timeout: Duration::from_secs(30),
        }
    }

    /// Isolated config for tests: everything under `state_dir`, watchdogs
    /// tight enough to observe without waiting.
    pub fn for_tests(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            conductor_watchdog: Duration::from_millis(300),
            stale_after: Duration::from_millis(500),
            default_task_timeout: Duration::from_secs(10),
            stop_barrier_timeout: Duration::from_secs(5),
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join("registry.json")
    }

    pub fn ledger_path(&self, cluster_id: &str) -> PathBuf {
        self.state_dir.join(format!("{cluster_id}.db"))
    }
}
