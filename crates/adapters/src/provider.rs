// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider adapter seam.

use crate::stream::StreamEvent;
use std::collections::HashMap;
use std::path::PathBuf;

/// Options shaping one provider invocation.
#[derive(Debug, Clone, Default)]
pub struct ProviderOpts {
    /// Model name, already merged from agent spec and cluster override.
    pub model: Option<String>,
    /// Provider-specific effort/reasoning level.
    pub level: Option<String>,
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,
    /// Extra environment entries.
    pub env: HashMap<String, String>,
}

/// A fully shaped provider command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCommand {
    pub binary: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// One LLM provider CLI: how to invoke it and how to read its stream.
///
/// Implementations are stateless; per-process parse state (tool-call
/// pairing) lives with the agent that owns the child process.
pub trait Provider: Send + Sync + 'static {
    /// Short name used in `AGENT_OUTPUT` payloads (e.g. `claude`).
    fn name(&self) -> &str;

    /// Shape the argv/env for one task.
    fn build_command(&self, prompt: &str, opts: &ProviderOpts) -> ProviderCommand;

    /// Parse one stdout line into zero or more semantic events. Unparseable
    /// lines degrade to a single `Text` event rather than being dropped.
    fn parse_event(&self, line: &str) -> Vec<StreamEvent>;
}
