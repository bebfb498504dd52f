// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zs-adapters: Provider adapters and subprocess execution.
//!
//! A provider is an external CLI that performs one LLM task. The adapter
//! seam has two halves: [`Provider`] shapes the command line and parses the
//! provider's stream output into semantic events; [`CommandRunner`] spawns
//! and supervises the child process. Both are trait objects so tests (and
//! container routing) can swap them out.

pub mod claude;
pub mod provider;
pub mod runner;
pub mod stream;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use claude::ClaudeProvider;
pub use provider::{Provider, ProviderCommand, ProviderOpts};
pub use runner::{
    CommandRunner, ExitedChild, HostRunner, RunnerError, RunningChild, SpawnSpec, StreamLine,
};
pub use stream::{StreamEvent, UsageSample};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProvider, FakeRunner, ScriptedRun};
