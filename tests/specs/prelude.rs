// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end specs.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zs_adapters::{FakeProvider, FakeRunner};
use zs_blueprint::{AgentSpec, Blueprint, CompletionHook, TriggerSpec};
use zs_core::ClusterState;
use zs_engine::{EngineConfig, Orchestrator};

pub use zs_adapters::ScriptedRun;
pub use zs_core::{ClusterId, Topic};

pub const SPEC_WAIT: Duration = Duration::from_secs(15);

pub type SpecOrchestrator = Orchestrator<FakeProvider, FakeRunner>;

pub struct Fleet {
    pub _dir: TempDir,
    pub orchestrator: Arc<SpecOrchestrator>,
    pub runner: Arc<FakeRunner>,
}

impl Fleet {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let orchestrator = Orchestrator::new(
            EngineConfig::for_tests(dir.path()),
            Arc::new(FakeProvider),
            Arc::clone(&runner),
        );
        Self { _dir: dir, orchestrator, runner }
    }

    pub fn registry_state(&self, id: &ClusterId) -> Option<ClusterState> {
        // Reads the shared registry file exactly like a second process would.
        self.orchestrator.status(id).ok()
    }
}

pub async fn wait_for(max: Duration, check: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < max {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    check()
}

/// The three-agent pipeline of the bootstrap scenario: planner →
/// implementer → completion watcher.
pub fn three_stage_pipeline() -> Blueprint {
    Blueprint {
        agents: vec![
            AgentSpec::new("planner", "planning")
                .trigger(TriggerSpec::on("ISSUE_OPENED"))
                .on_complete(CompletionHook::publish("PLAN_READY")),
            AgentSpec::new("implementer", "implementation")
                .trigger(TriggerSpec::on("PLAN_READY"))
                .on_complete(CompletionHook::publish("IMPLEMENTATION_READY")),
            {
                let mut closer = AgentSpec::new("completion-orchestrator", "orchestration")
                    .trigger(TriggerSpec::on("IMPLEMENTATION_READY").stopping());
                closer.timeout_secs = Some(0);
                closer
            },
        ],
    }
}
