// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation-chain scenarios: validated self-mutation of a live topology.

use crate::specs::prelude::*;
use zs_blueprint::{AgentSpec, Blueprint, TriggerSpec};
use zs_core::MessageDraft;
use zs_engine::{BlueprintSource, StartOptions};

fn seed() -> Blueprint {
    Blueprint {
        agents: vec![AgentSpec::new("worker", "implementation")
            .trigger(TriggerSpec::on("NEVER_SENT"))],
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_id_proposal_is_rejected_without_mutation() {
    let fleet = Fleet::new();
    fleet.runner.set_fallback(ScriptedRun::succeeding(Vec::new()));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("x", BlueprintSource::Inline(seed())))
        .await
        .unwrap();
    let handle = fleet.orchestrator.handle(&id).unwrap();

    handle
        .bus
        .publish(MessageDraft::new("CLUSTER_OPERATIONS", "worker").data(serde_json::json!({
            "operations": [
                {"action": "add_agents", "agents": [
                    {"id": "worker", "role": "duplicate"},
                    {"id": "fresh", "role": "extra"}
                ]}
            ]
        })))
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || {
            handle
                .bus
                .find_last(
                    handle.bus.criteria().topic(Topic::CLUSTER_OPERATIONS_VALIDATION_FAILED),
                )
                .ok()
                .flatten()
                .is_some()
        })
        .await
    );

    let rejection = handle
        .bus
        .find_last(handle.bus.criteria().topic(Topic::CLUSTER_OPERATIONS_VALIDATION_FAILED))
        .unwrap()
        .unwrap();
    let error = rejection.content.data.unwrap()["error"].as_str().unwrap().to_string();
    assert!(error.contains("worker"), "must name the duplicate id: {error}");

    // Nothing mutated: the rejected add (including the valid half) was
    // discarded whole.
    let ids: Vec<String> = handle.blueprint.lock().agents.iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["worker"]);
    assert_eq!(handle.agent_statuses().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_chain_gets_exactly_one_outcome_message() {
    let fleet = Fleet::new();
    fleet.runner.set_fallback(ScriptedRun::succeeding(Vec::new()));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("x", BlueprintSource::Inline(seed())))
        .await
        .unwrap();
    let handle = fleet.orchestrator.handle(&id).unwrap();

    // One valid chain, one structurally broken chain.
    handle
        .bus
        .publish(MessageDraft::new("CLUSTER_OPERATIONS", "worker").data(serde_json::json!({
            "operations": [
                {"action": "update_agent", "id": "worker", "patch": {"model": "faster"}}
            ]
        })))
        .unwrap();
    handle
        .bus
        .publish(MessageDraft::new("CLUSTER_OPERATIONS", "worker").data(serde_json::json!({
            "operations": [{"action": "self_destruct"}]
        })))
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || {
            let success = handle
                .bus
                .query(handle.bus.criteria().topic(Topic::CLUSTER_OPERATIONS_SUCCESS))
                .unwrap()
                .len();
            let rejected = handle
                .bus
                .query(handle.bus.criteria().topic(Topic::CLUSTER_OPERATIONS_VALIDATION_FAILED))
                .unwrap()
                .len();
            success == 1 && rejected == 1
        })
        .await
    );
    assert_eq!(
        handle.blueprint.lock().agent("worker").unwrap().model.as_deref(),
        Some("faster")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn chain_mutations_survive_stop_and_resume() {
    let fleet = Fleet::new();
    fleet.runner.set_fallback(ScriptedRun::succeeding(Vec::new()));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("x", BlueprintSource::Inline(seed())))
        .await
        .unwrap();
    let handle = fleet.orchestrator.handle(&id).unwrap();

    handle
        .bus
        .publish(MessageDraft::new("CLUSTER_OPERATIONS", "worker").data(serde_json::json!({
            "operations": [
                {"action": "add_agents", "agents": [
                    {"id": "reviewer", "role": "review",
                     "triggers": [{"topic": "IMPLEMENTATION_READY"}]}
                ]},
                {"action": "update_agent", "id": "worker", "patch": {"model": "faster"}}
            ]
        })))
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || {
            handle
                .bus
                .find_last(handle.bus.criteria().topic(Topic::CLUSTER_OPERATIONS_SUCCESS))
                .ok()
                .flatten()
                .is_some()
        })
        .await
    );

    // The registry record carries the post-chain graph immediately, before
    // any stop.
    let registry = zs_engine::Registry::new(&fleet.orchestrator.config().state_dir);
    let record = registry.load().unwrap()[id.as_str()].clone();
    assert!(record.blueprint.agent("reviewer").is_some());
    assert_eq!(record.blueprint.agent("worker").unwrap().model.as_deref(), Some("faster"));

    fleet.orchestrator.stop(&id).await.unwrap();
    fleet.orchestrator.resume(&id).await.unwrap();

    // The revived cluster runs the mutated topology, not the seed.
    let revived = fleet.orchestrator.handle(&id).unwrap();
    assert!(revived.blueprint.lock().agent("reviewer").is_some());
    assert_eq!(
        revived.blueprint.lock().agent("worker").unwrap().model.as_deref(),
        Some("faster")
    );
    let statuses = revived.agent_statuses();
    assert!(statuses.iter().any(|s| s.id == "reviewer"));
    assert!(statuses.iter().any(|s| s.id == "worker"));
}

#[tokio::test(flavor = "multi_thread")]
async fn load_config_adds_template_agents_to_a_live_cluster() {
    let fleet = Fleet::new();
    fleet.runner.set_fallback(ScriptedRun::succeeding(Vec::new()));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("x", BlueprintSource::Inline(seed())))
        .await
        .unwrap();
    let handle = fleet.orchestrator.handle(&id).unwrap();

    handle
        .bus
        .publish(MessageDraft::new("CLUSTER_OPERATIONS", "worker").data(serde_json::json!({
            "operations": [
                {"action": "remove_agents", "ids": ["worker"]},
                {"action": "load_config", "config": "solo"}
            ]
        })))
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || {
            handle
                .bus
                .find_last(handle.bus.criteria().topic(Topic::CLUSTER_OPERATIONS_SUCCESS))
                .ok()
                .flatten()
                .is_some()
        })
        .await
    );
    let ids: Vec<String> = handle.blueprint.lock().agents.iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["implementer", "completion-orchestrator"]);
    let statuses = handle.agent_statuses();
    assert!(statuses.iter().all(|s| s.id != "worker"));
    assert!(statuses.iter().any(|s| s.id == "implementer"));
}
