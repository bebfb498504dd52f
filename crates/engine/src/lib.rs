// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zs-engine: Agent wrappers, sub-clusters, and the cluster orchestrator.
//!
//! The orchestrator owns every cluster in this process: it allocates ids,
//! opens ledgers, wires subscriptions, brings up isolation, starts agents,
//! enforces completion/failure policy (watchdogs, retry exhaustion), and
//! persists cluster records to a file-locked shared registry so a second
//! process can observe, stop, kill, or resume them.

pub mod agent;
pub mod barrier;
pub mod config;
pub mod env;
pub mod error;
pub mod names;
pub mod orchestrator;
pub mod registry;
pub mod subcluster;

pub use agent::{Agent, AgentDeps, AgentWrapper};
pub use barrier::InitBarrier;
pub use config::EngineConfig;
pub use error::{OrchestratorError, RegistryError};
pub use orchestrator::{
    BlueprintSource, ClusterHandle, ClusterInput, IsolationMode, Orchestrator, StartOptions,
    CONDUCTOR_WATCHDOG_REASON,
};
pub use registry::{ClusterRecord, Registry};
pub use subcluster::SubClusterWrapper;
