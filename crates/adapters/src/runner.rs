// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess supervision for provider commands.
//!
//! Every spawn runs under a wall-clock bound; `timeout: None` (infinite) is
//! only handed out by the engine for `stop_cluster` watcher agents, never
//! for real work. Termination escalates: SIGTERM, a short grace period,
//! then SIGKILL.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Grace period between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

/// One line from a child's stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Stdout(String),
    Stderr(String),
}

impl StreamLine {
    pub fn text(&self) -> &str {
        match self {
            StreamLine::Stdout(s) | StreamLine::Stderr(s) => s,
        }
    }
}

/// How a supervised child finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitedChild {
    pub code: Option<i32>,
    pub timed_out: bool,
    pub terminated: bool,
}

impl ExitedChild {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out && !self.terminated
    }
}

/// Everything to spawn one supervised child.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    pub binary: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Wall-clock bound. `None` means infinite and is reserved for
    /// `stop_cluster` watcher agents.
    pub timeout: Option<Duration>,
}

/// Handle to a live supervised child.
#[derive(Debug)]
pub struct RunningChild {
    pub pid: Option<u32>,
    /// Line-framed interleaved stdout/stderr. Closed when both pipes end.
    pub lines: mpsc::Receiver<StreamLine>,
    exit: oneshot::Receiver<ExitedChild>,
    terminate: CancellationToken,
}

impl RunningChild {
    /// Ask the child to stop (SIGTERM, grace, SIGKILL).
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    /// A clonable handle that triggers the same termination path.
    pub fn terminate_token(&self) -> CancellationToken {
        self.terminate.clone()
    }

    /// Await the exit report. Call after draining `lines`.
    pub async fn wait(self) -> ExitedChild {
        self.exit.await.unwrap_or(ExitedChild { code: None, timed_out: false, terminated: true })
    }

    /// Assemble a child from pre-wired channels. Used by fake runners and
    /// by container routing, which supervise the process themselves.
    pub fn from_parts(
        pid: Option<u32>,
        lines: mpsc::Receiver<StreamLine>,
        exit: oneshot::Receiver<ExitedChild>,
        terminate: CancellationToken,
    ) -> Self {
        Self { pid, lines, exit, terminate }
    }
}

/// Spawns processes for providers (and anything else the engine runs).
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn spawn(&self, spec: SpawnSpec) -> Result<RunningChild, RunnerError>;
}

/// Real host-process runner over `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn spawn(&self, spec: SpawnSpec) -> Result<RunningChild, RunnerError> {
        let mut command = tokio::process::Command::new(&spec.binary);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|source| RunnerError::Spawn { binary: spec.binary.clone(), source })?;
        let pid = child.id();

        let (line_tx, line_rx) = mpsc::channel(256);
        let (exit_tx, exit_rx) = oneshot::channel();
        let terminate = CancellationToken::new();

        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(StreamLine::Stdout(line)).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(StreamLine::Stderr(line)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(line_tx);

        let token = terminate.clone();
        let timeout = spec.timeout;
        tokio::spawn(async move {
            enum WaitEnd {
                Exited(Option<i32>),
                TimedOut,
                Terminated,
            }

            let deadline = async {
                match timeout {
                    Some(t) => tokio::time::sleep(t).await,
                    None => std::future::pending::<()>().await,
                }
            };

            // The select only names the outcome; the kill escalation runs
            // after it so the child is no longer borrowed by `wait()`.
            let end = tokio::select! {
                status = child.wait() => WaitEnd::Exited(status.ok().and_then(|s| s.code())),
                _ = deadline => WaitEnd::TimedOut,
                _ = token.cancelled() => WaitEnd::Terminated,
            };

            let report = match end {
                WaitEnd::Exited(code) => {
                    ExitedChild { code, timed_out: false, terminated: false }
                }
                WaitEnd::TimedOut => {
                    escalate_kill(&mut child, pid).await;
                    ExitedChild { code: None, timed_out: true, terminated: false }
                }
                WaitEnd::Terminated => {
                    escalate_kill(&mut child, pid).await;
                    ExitedChild { code: None, timed_out: false, terminated: true }
                }
            };
            let _ = exit_tx.send(report);
        });

        Ok(RunningChild { pid, lines: line_rx, exit: exit_rx, terminate })
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL.
async fn escalate_kill(child: &mut tokio::process::Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(pid, "child ignored SIGTERM; escalating to SIGKILL");
    }
    let _ = child.kill().await;
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
