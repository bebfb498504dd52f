// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Housekeeping for orphaned isolation artifacts.
//!
//! Killed clusters vanish from the registry, but their temp-dir leftovers
//! can survive a crash between kill and cleanup. The sweep removes any
//! per-cluster directory whose cluster id the registry no longer knows.

use crate::paths;
use std::collections::HashSet;
use std::path::PathBuf;

/// Remove isolation directories belonging to no known cluster. Returns the
/// paths that were removed. Removal failures are logged and skipped.
pub async fn sweep_orphans(known_cluster_ids: &HashSet<String>) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for root in [paths::worktrees_root(), paths::isolated_root(), paths::configs_root()] {
        let Ok(mut entries) = tokio::fs::read_dir(&root).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if known_cluster_ids.contains(&name) {
                continue;
            }
            let path = entry.path();
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed orphaned isolation dir");
                    removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "orphan sweep could not remove dir");
                }
            }
        }
    }
    removed
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
