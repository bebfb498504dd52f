// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve the state directory:
/// `ZEROSHOT_STATE_DIR` > `$XDG_STATE_HOME/zeroshot` > `~/.local/state/zeroshot`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ZEROSHOT_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("zeroshot");
        }
    }
    dirs::state_dir()
        .map(|d| d.join("zeroshot"))
        .unwrap_or_else(|| PathBuf::from(".zeroshot-state"))
}

/// True when running as a background cluster supervisor (`ZEROSHOT_DAEMON=1`).
/// Suppresses interactive output and enables daemon cleanup handlers.
pub fn is_daemon() -> bool {
    std::env::var("ZEROSHOT_DAEMON").map(|v| v == "1").unwrap_or(false)
}

/// Explicit cluster id for a child process spawned to run one cluster.
pub fn cluster_id_override() -> Option<String> {
    std::env::var("ZEROSHOT_CLUSTER_ID").ok().filter(|v| !v.is_empty())
}

/// Target working directory for agents inside the owned cluster.
pub fn cwd_override() -> Option<PathBuf> {
    std::env::var("ZEROSHOT_CWD").ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Stale-agent warning threshold (`ZEROSHOT_STALE_AFTER_SECS`, default 10 min).
pub fn stale_after() -> Duration {
    std::env::var("ZEROSHOT_STALE_AFTER_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(600))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
