// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel working-tree copy for container isolation.
//!
//! Walks the source tree once (creating the directory skeleton and
//! collecting file pairs), then a bounded pool of workers drains the copy
//! queue. Build and cache artifacts never cross into the isolated copy.

use crate::error::IsolationError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of concurrent copy workers.
const COPY_WORKERS: usize = 8;

/// Directory names excluded from the isolated copy.
const EXCLUDED_DIRS: [&str; 12] = [
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    ".cache",
    "__pycache__",
    ".venv",
    "venv",
    ".next",
    ".terraform",
    ".turbo",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    pub skipped_dirs: usize,
}

/// Copy `src` into `dst` (created if needed), excluding artifact dirs.
pub async fn copy_tree(src: &Path, dst: &Path) -> Result<CopyStats, IsolationError> {
    let mut stats = CopyStats::default();
    let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
    let mut dirs: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
    dirs.push_back((src.to_path_buf(), dst.to_path_buf()));

    // Single-threaded walk building the skeleton and the file work queue.
    while let Some((from, to)) = dirs.pop_front() {
        tokio::fs::create_dir_all(&to).await.map_err(|e| IsolationError::io(to.clone(), e))?;
        stats.dirs += 1;
        let mut entries =
            tokio::fs::read_dir(&from).await.map_err(|e| IsolationError::io(from.clone(), e))?;
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| IsolationError::io(from.clone(), e))?
        {
            let name = entry.file_name();
            let kind = entry.file_type().await.map_err(|e| IsolationError::io(entry.path(), e))?;
            if kind.is_dir() {
                if EXCLUDED_DIRS.iter().any(|d| name == *d) {
                    stats.skipped_dirs += 1;
                    continue;
                }
                dirs.push_back((entry.path(), to.join(&name)));
            } else if kind.is_file() {
                queue.push_back((entry.path(), to.join(&name)));
            }
            // Symlinks are dropped: they may point outside the sandbox.
        }
    }

    stats.files = queue.len();
    let queue = Arc::new(parking_lot::Mutex::new(queue));
    let failure: Arc<parking_lot::Mutex<Option<IsolationError>>> =
        Arc::new(parking_lot::Mutex::new(None));

    let mut workers = Vec::with_capacity(COPY_WORKERS);
    for _ in 0..COPY_WORKERS {
        let queue = Arc::clone(&queue);
        let failure = Arc::clone(&failure);
        workers.push(tokio::spawn(async move {
            loop {
                let job = queue.lock().pop_front();
                let Some((from, to)) = job else { break };
                if failure.lock().is_some() {
                    break;
                }
                if let Err(e) = tokio::fs::copy(&from, &to).await {
                    *failure.lock() = Some(IsolationError::io(from, e));
                    break;
                }
            }
        }));
    }
    for worker in workers {
        let _ = worker.await;
    }

    let mut failure = failure.lock();
    match failure.take() {
        Some(err) => Err(err),
        None => Ok(stats),
    }
}

#[cfg(test)]
#[path = "copytree_tests.rs"]
mod tests;
