// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap-to-completion and failure-exhaustion scenarios.

use crate::specs::prelude::*;
use zs_core::payload::FromData;
use zs_core::ClusterState;
use zs_engine::{BlueprintSource, StartOptions};

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_and_clean_completion() {
    let fleet = Fleet::new();
    fleet.runner.push(ScriptedRun::completing_with("the plan"));
    fleet.runner.push(ScriptedRun::completing_with("the implementation"));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt(
            "Add logging",
            BlueprintSource::Inline(three_stage_pipeline()),
        ))
        .await
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || fleet.registry_state(&id) == Some(ClusterState::Stopped)).await,
        "cluster must reach stopped"
    );

    // The ledger tells the whole story, in order.
    let handle = fleet.orchestrator.handle(&id).unwrap();
    let all = handle.bus.get_all().unwrap();
    let topics: Vec<&str> = all.iter().map(|m| m.topic.as_str()).collect();

    let position = |topic: &str| {
        topics
            .iter()
            .position(|t| *t == topic)
            .unwrap_or_else(|| panic!("{topic} missing from {topics:?}"))
    };
    let issue = position("ISSUE_OPENED");
    let plan = position("PLAN_READY");
    let implementation = position("IMPLEMENTATION_READY");
    let complete = position("CLUSTER_COMPLETE");
    assert!(issue < plan && plan < implementation && implementation < complete);

    // At least one output from each worker.
    let planner_output = all
        .iter()
        .any(|m| m.topic.as_str() == "AGENT_OUTPUT" && m.sender == "planner");
    let implementer_output = all
        .iter()
        .any(|m| m.topic.as_str() == "AGENT_OUTPUT" && m.sender == "implementer");
    assert!(planner_output && implementer_output);

    // Token accounting rolled up per role.
    let tokens = handle.bus.tokens_by_role().unwrap();
    assert!(tokens["planning"].input_tokens > 0);
    assert!(tokens["implementation"].input_tokens > 0);
    assert_eq!(
        tokens["_total"].input_tokens,
        tokens["planning"].input_tokens + tokens["implementation"].input_tokens
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_implementer_stops_the_cluster_after_three_attempts() {
    let fleet = Fleet::new();
    fleet.runner.push(ScriptedRun::completing_with("the plan"));
    fleet.runner.set_fallback(ScriptedRun::failing("cannot implement"));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt(
            "Add logging",
            BlueprintSource::Inline(three_stage_pipeline()),
        ))
        .await
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || fleet.registry_state(&id) == Some(ClusterState::Stopped)).await
    );

    let handle = fleet.orchestrator.handle(&id).unwrap();
    let errors = handle
        .bus
        .query(handle.bus.criteria().topic(Topic::AGENT_ERROR).sender("implementer"))
        .unwrap();
    let attempts: Vec<u32> = errors
        .iter()
        .map(|m| zs_core::AgentErrorPayload::from_message(m).unwrap().attempts)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let record = handle.record();
    assert_eq!(record.state, ClusterState::Stopped);
    assert_eq!(record.failure_info.unwrap().agent_id, "implementer");
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_clears_pid_and_survives_a_second_stop() {
    let fleet = Fleet::new();
    fleet.runner.set_fallback(ScriptedRun::succeeding(Vec::new()));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt(
            "idle cluster",
            BlueprintSource::Inline(three_stage_pipeline()),
        ))
        .await
        .unwrap();

    fleet.orchestrator.stop(&id).await.unwrap();
    assert_eq!(fleet.registry_state(&id), Some(ClusterState::Stopped));

    let handle = fleet.orchestrator.handle(&id).unwrap();
    assert_eq!(handle.record().pid, None);
    for agent in handle.agent_statuses() {
        assert_eq!(agent.phase, zs_core::AgentPhase::Stopped);
    }

    // Idempotent.
    fleet.orchestrator.stop(&id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn zombie_cluster_is_reported_and_killable() {
    let fleet = Fleet::new();

    // A record left behind by a crashed process: running, dead pid.
    let id = ClusterId::new("cluster-crashed-1");
    let mut record = zs_engine::ClusterRecord::new(id.clone(), three_stage_pipeline(), 1);
    record.state = ClusterState::Running;
    record.pid = Some(u32::MAX - 2);
    {
        let registry = zs_engine::Registry::new(&fleet.orchestrator.config().state_dir);
        registry.persist(&record, true).unwrap();
        let ledger =
            zs_ledger::Ledger::open(fleet.orchestrator.config().ledger_path(id.as_str())).unwrap();
        ledger
            .append(&id, zs_core::MessageDraft::new("ISSUE_OPENED", "orchestrator").text("x"))
            .unwrap();
    }

    assert_eq!(fleet.registry_state(&id), Some(ClusterState::Zombie));
    let listed = fleet.orchestrator.list().unwrap();
    assert!(listed.iter().any(|(lid, state)| lid == &id && *state == ClusterState::Zombie));

    fleet.orchestrator.kill(&id).await.unwrap();
    assert!(fleet.registry_state(&id).is_none());
}
