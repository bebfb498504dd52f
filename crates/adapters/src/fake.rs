// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake provider and runner for tests.
//!
//! `FakeProvider` treats every scripted line as an already-parsed
//! [`StreamEvent`] in JSON form. `FakeRunner` replays scripted runs instead
//! of spawning real processes and records every spawn for assertions.

use crate::provider::{Provider, ProviderCommand, ProviderOpts};
use crate::runner::{CommandRunner, ExitedChild, RunnerError, RunningChild, SpawnSpec, StreamLine};
use crate::stream::StreamEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Provider whose stream format is plain JSON `StreamEvent`s.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider;

impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn build_command(&self, prompt: &str, opts: &ProviderOpts) -> ProviderCommand {
        let mut args = vec![prompt.to_string()];
        if let Some(model) = &opts.model {
            args.push(format!("--model={model}"));
        }
        ProviderCommand { binary: "fake-provider".to_string(), args, env: opts.env.clone() }
    }

    fn parse_event(&self, line: &str) -> Vec<StreamEvent> {
        if line.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => vec![event],
            Err(_) => vec![StreamEvent::Text { text: line.to_string() }],
        }
    }
}

/// One scripted child-process run.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    /// Lines emitted on stdout, in order.
    pub lines: Vec<String>,
    pub exit_code: i32,
    /// Delay before the lines start flowing (simulates a slow provider).
    pub delay: Duration,
}

impl ScriptedRun {
    pub fn succeeding(lines: Vec<String>) -> Self {
        Self { lines, exit_code: 0, delay: Duration::ZERO }
    }

    pub fn failing(stderr_line: &str) -> Self {
        Self { lines: vec![stderr_line.to_string()], exit_code: 1, delay: Duration::ZERO }
    }

    /// A run whose final line is a `result` stream event with the text.
    pub fn completing_with(text: &str) -> Self {
        Self::succeeding(vec![
            serde_json::json!({"type": "text", "text": text}).to_string(),
            serde_json::json!({
                "type": "result",
                "usage": {"inputTokens": 10, "outputTokens": 5, "totalCostUsd": 0.01},
                "text": text,
            })
            .to_string(),
        ])
    }
}

/// Replays scripted runs in order; repeats the last script when the queue
/// runs dry (or a default empty success if nothing was scripted).
#[derive(Clone, Default)]
pub struct FakeRunner {
    scripts: Arc<Mutex<VecDeque<ScriptedRun>>>,
    fallback: Arc<Mutex<Option<ScriptedRun>>>,
    spawned: Arc<Mutex<Vec<SpawnSpec>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, run: ScriptedRun) {
        self.scripts.lock().push_back(run);
    }

    /// Script used when the queue is empty.
    pub fn set_fallback(&self, run: ScriptedRun) {
        *self.fallback.lock() = Some(run);
    }

    /// Every spawn spec seen so far, in order.
    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.spawned.lock().clone()
    }

    fn next_script(&self) -> ScriptedRun {
        if let Some(run) = self.scripts.lock().pop_front() {
            return run;
        }
        self.fallback
            .lock()
            .clone()
            .unwrap_or_else(|| ScriptedRun::succeeding(Vec::new()))
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn spawn(&self, spec: SpawnSpec) -> Result<RunningChild, RunnerError> {
        self.spawned.lock().push(spec);
        let script = self.next_script();

        let (line_tx, line_rx) = mpsc::channel(256);
        let (exit_tx, exit_rx) = oneshot::channel();
        let terminate = CancellationToken::new();
        let token = terminate.clone();

        tokio::spawn(async move {
            if !script.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(script.delay) => {}
                    _ = token.cancelled() => {
                        let _ = exit_tx.send(ExitedChild {
                            code: None,
                            timed_out: false,
                            terminated: true,
                        });
                        return;
                    }
                }
            }
            for line in script.lines {
                if token.is_cancelled() {
                    break;
                }
                if line_tx.send(StreamLine::Stdout(line)).await.is_err() {
                    break;
                }
            }
            drop(line_tx);
            let report = if token.is_cancelled() {
                ExitedChild { code: None, timed_out: false, terminated: true }
            } else {
                ExitedChild { code: Some(script.exit_code), timed_out: false, terminated: false }
            };
            let _ = exit_tx.send(report);
        });

        Ok(RunningChild::from_parts(Some(99_999), line_rx, exit_rx, terminate))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
