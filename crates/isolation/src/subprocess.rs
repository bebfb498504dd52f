// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess helpers.
//!
//! Every external command run by the isolation layer goes through
//! [`run_with_timeout`]; a command without a timeout is a defect, and a
//! zero timeout is rejected outright.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;

/// Git plumbing (worktree add/remove, init sequences).
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Container lifecycle commands (run, stop, rm, inspect).
pub const DOCKER_TIMEOUT: Duration = Duration::from_secs(120);
/// Dependency preinstall — package managers are slow.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(900);
/// Default for `exec_in_container` when the caller does not choose one.
pub const EXEC_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {seconds}s")]
    TimedOut { label: String, seconds: u64 },

    #[error("{label} requires a non-zero timeout")]
    ZeroTimeout { label: String },

    #[error("{label} failed to run: {source}")]
    Io {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion under a wall-clock bound, killing it (and
/// its output capture) when the bound is hit.
pub async fn run_with_timeout(
    mut cmd: tokio::process::Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    if timeout.is_zero() {
        return Err(SubprocessError::ZeroTimeout { label: label.to_string() });
    }
    cmd.kill_on_drop(true);
    let work = cmd.output();
    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Io { label: label.to_string(), source }),
        Err(_) => {
            Err(SubprocessError::TimedOut { label: label.to_string(), seconds: timeout.as_secs() })
        }
    }
}

/// First line of stderr (or stdout) for error reporting.
pub fn brief_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().find(|l| !l.trim().is_empty());
    match line {
        Some(line) => line.trim().to_string(),
        None => String::from_utf8_lossy(&output.stdout)
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no output")
            .trim()
            .to_string(),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
