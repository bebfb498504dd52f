// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree-mode isolation.
//!
//! A cluster gets a branch `zeroshot/<cluster-suffix>` and a worktree under
//! the host temp directory. Stop preserves the worktree for resume; kill
//! removes it but the branch survives either way.

use crate::error::IsolationError;
use crate::paths;
use crate::subprocess::{brief_output, run_with_timeout, GIT_TIMEOUT};
use std::path::Path;
use zs_core::{ClusterId, WorktreeRecord};

/// Name of the discovery file written into a fresh worktree so auxiliary
/// tooling can find its way back to the main repository.
pub const DISCOVERY_FILE: &str = ".zeroshot-repo";

const BRANCH_RETRIES: u32 = 4;

fn git(repo: &Path, args: &[&str]) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("git");
    cmd.arg("-C")
        .arg(repo)
        .args(args)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    cmd
}

/// True when `path` is inside a git work tree.
pub async fn is_git_repo(path: &Path) -> bool {
    match run_with_timeout(
        git(path, &["rev-parse", "--is-inside-work-tree"]),
        GIT_TIMEOUT,
        "git rev-parse",
    )
    .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Create the cluster's worktree and branch.
///
/// Branch allocation retries with a random hex suffix when the name is
/// taken or checked out elsewhere.
pub async fn create_worktree(
    cluster_id: &ClusterId,
    repo_root: &Path,
) -> Result<WorktreeRecord, IsolationError> {
    if !is_git_repo(repo_root).await {
        return Err(IsolationError::NotAGitRepo { path: repo_root.to_path_buf() });
    }

    let path = paths::worktree_dir(cluster_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IsolationError::io(parent.to_path_buf(), e))?;
    }

    let base = format!("zeroshot/{}", cluster_id.suffix());
    let mut branch = base.clone();
    let mut last_detail = String::new();

    for attempt in 0..BRANCH_RETRIES {
        if attempt > 0 {
            branch = format!("{base}-{}", nanoid::nanoid!(4, &HEX_ALPHABET));
        }
        let path_arg = path.display().to_string();
        let output = run_with_timeout(
            git(repo_root, &["worktree", "add", "-b", &branch, &path_arg, "HEAD"]),
            GIT_TIMEOUT,
            "git worktree add",
        )
        .await?;

        if output.status.success() {
            // Baseline commit so the branch is visible even before the first
            // agent writes anything; batched into one shell invocation.
            let mut baseline = tokio::process::Command::new("sh");
            baseline.arg("-c").arg(format!(
                "cd {} && git commit --allow-empty -m 'zeroshot: baseline' --quiet",
                shell_quote(&path_arg)
            ));
            if let Ok(out) = run_with_timeout(baseline, GIT_TIMEOUT, "worktree baseline").await {
                if !out.status.success() {
                    tracing::debug!(branch = %branch, "baseline commit skipped: {}", brief_output(&out));
                }
            }
            write_discovery_file(&path, repo_root).await;
            return Ok(WorktreeRecord {
                path: path.clone(),
                branch,
                repo_root: repo_root.to_path_buf(),
                work_dir: path.clone(),
            });
        }

        last_detail = brief_output(&output);
        let retryable = last_detail.contains("already exists")
            || last_detail.contains("already checked out")
            || last_detail.contains("already used by worktree");
        if !retryable {
            break;
        }
        tracing::debug!(branch = %branch, "branch in use, retrying with hex suffix");
    }

    Err(IsolationError::Git { context: "worktree add", detail: last_detail })
}

async fn write_discovery_file(worktree: &Path, repo_root: &Path) {
    let body = format!("{}\n", repo_root.display());
    if let Err(e) = tokio::fs::write(worktree.join(DISCOVERY_FILE), body).await {
        tracing::debug!(error = %e, "could not write worktree discovery file");
    }
}

/// Remove a cluster's worktree, tolerating stale metadata: prune, retry,
/// and finally force-remove the directory. The branch is preserved.
pub async fn remove_worktree(record: &WorktreeRecord) -> Result<(), IsolationError> {
    let path_arg = record.path.display().to_string();

    let first = run_with_timeout(
        git(&record.repo_root, &["worktree", "remove", "--force", &path_arg]),
        GIT_TIMEOUT,
        "git worktree remove",
    )
    .await;

    let removed = matches!(&first, Ok(output) if output.status.success());
    if !removed {
        // Stale metadata: prune bookkeeping and retry once.
        let _ = run_with_timeout(
            git(&record.repo_root, &["worktree", "prune"]),
            GIT_TIMEOUT,
            "git worktree prune",
        )
        .await;
        let second = run_with_timeout(
            git(&record.repo_root, &["worktree", "remove", "--force", &path_arg]),
            GIT_TIMEOUT,
            "git worktree remove (retry)",
        )
        .await;
        if !matches!(&second, Ok(output) if output.status.success()) {
            tracing::warn!(path = %record.path.display(), "worktree remove failed; force-deleting directory");
        }
    }

    if record.path.exists() {
        tokio::fs::remove_dir_all(&record.path)
            .await
            .map_err(|e| IsolationError::io(record.path.clone(), e))?;
        let _ = run_with_timeout(
            git(&record.repo_root, &["worktree", "prune"]),
            GIT_TIMEOUT,
            "git worktree prune (final)",
        )
        .await;
    }
    Ok(())
}

const HEX_ALPHABET: [char; 16] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f'];

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
