// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::EngineConfig;
use std::sync::Arc;
use tempfile::TempDir;
use zs_adapters::{FakeProvider, FakeRunner};
use zs_blueprint::{AgentSpec, TriggerSpec};
use zs_core::test_support;
use zs_core::ClusterId;
use zs_ledger::Ledger;

fn deps(dir: &TempDir) -> AgentDeps<FakeProvider, FakeRunner, zs_core::SystemClock> {
    let ledger = Arc::new(Ledger::open(dir.path().join("triggers.db")).unwrap());
    let bus = MessageBus::new(ledger, ClusterId::new("cluster-test-1"));
    AgentDeps {
        bus,
        provider: Arc::new(FakeProvider),
        runner: Arc::new(FakeRunner::new()),
        config: EngineConfig::for_tests(dir.path()),
        blueprint: Arc::new(Mutex::new(Blueprint {
            agents: vec![AgentSpec::new("v1", "validation"), AgentSpec::new("v2", "validation")],
        })),
        cwd: None,
        model_override: None,
        container: None,
    }
}

#[test]
fn topic_only_trigger_fires_on_match() {
    let dir = TempDir::new().unwrap();
    let deps = deps(&dir);
    let spec = AgentSpec::new("a", "r").trigger(TriggerSpec::on("PLAN_READY"));

    assert!(select_trigger(&spec, &test_support::message("PLAN_READY", "x", 1), &deps).is_some());
    assert!(select_trigger(&spec, &test_support::message("OTHER", "x", 1), &deps).is_none());
}

#[test]
fn script_gates_the_trigger() {
    let dir = TempDir::new().unwrap();
    let deps = deps(&dir);
    let spec = AgentSpec::new("a", "r").trigger(
        TriggerSpec::on("VALIDATION_RESULT").with_script("message.content.data.approved"),
    );

    let approved = test_support::message_with_data(
        "VALIDATION_RESULT",
        "validator",
        1,
        serde_json::json!({"approved": true}),
    );
    let rejected = test_support::message_with_data(
        "VALIDATION_RESULT",
        "validator",
        2,
        serde_json::json!({"approved": false}),
    );
    assert!(select_trigger(&spec, &approved, &deps).is_some());
    assert!(select_trigger(&spec, &rejected, &deps).is_none());
}

#[test]
fn failing_script_means_did_not_fire() {
    let dir = TempDir::new().unwrap();
    let deps = deps(&dir);
    // Host access attempt: unknown binding, logged, not fired.
    let spec = AgentSpec::new("a", "r")
        .trigger(TriggerSpec::on("PLAN_READY").with_script("process.exit == null"));
    assert!(select_trigger(&spec, &test_support::message("PLAN_READY", "x", 1), &deps).is_none());

    // Unparseable script: same outcome.
    let spec = AgentSpec::new("a", "r")
        .trigger(TriggerSpec::on("PLAN_READY").with_script("message.topic =="));
    assert!(select_trigger(&spec, &test_support::message("PLAN_READY", "x", 1), &deps).is_none());
}

#[test]
fn first_matching_trigger_wins() {
    let dir = TempDir::new().unwrap();
    let deps = deps(&dir);
    let spec = AgentSpec::new("a", "r")
        .trigger(TriggerSpec::on("PLAN_READY").with_script("false"))
        .trigger(TriggerSpec::on("PLAN_*").stopping());

    let selected =
        select_trigger(&spec, &test_support::message("PLAN_READY", "x", 1), &deps).unwrap();
    assert_eq!(selected.action, zs_blueprint::TriggerAction::StopCluster);
}

#[test]
fn live_host_reaches_blueprint_and_ledger() {
    let dir = TempDir::new().unwrap();
    let deps = deps(&dir);
    deps.bus.publish(test_support::draft("AGENT_ERROR", "v1")).unwrap();
    deps.bus.publish(test_support::draft("AGENT_ERROR", "v2")).unwrap();

    let spec = AgentSpec::new("a", "r").trigger(
        TriggerSpec::on("PLAN_READY").with_script(
            "cluster.getAgentsByRole('validation').length == 2 && ledger.count('AGENT_ERROR') == 2",
        ),
    );
    assert!(select_trigger(&spec, &test_support::message("PLAN_READY", "x", 1), &deps).is_some());

    let spec = AgentSpec::new("a", "r").trigger(
        TriggerSpec::on("PLAN_READY")
            .with_script("ledger.findLast('AGENT_ERROR').sender == 'v2'"),
    );
    assert!(select_trigger(&spec, &test_support::message("PLAN_READY", "x", 1), &deps).is_some());
}
