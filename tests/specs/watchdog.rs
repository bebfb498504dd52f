// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conductor watchdog scenarios.

use crate::specs::prelude::*;
use zs_blueprint::{AgentSpec, Blueprint, TriggerSpec};
use zs_core::payload::FromData;
use zs_engine::{BlueprintSource, StartOptions, CONDUCTOR_WATCHDOG_REASON};

fn conductor_only() -> Blueprint {
    Blueprint {
        agents: vec![AgentSpec::new("conductor", "conductor")
            .trigger(TriggerSpec::on("ISSUE_OPENED"))],
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_conductor_fails_the_cluster() {
    let fleet = Fleet::new();
    // Completes its task but never publishes CLUSTER_OPERATIONS.
    fleet.runner.set_fallback(ScriptedRun::completing_with("pondering"));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("orchestrate", BlueprintSource::Inline(conductor_only())))
        .await
        .unwrap();
    let handle = fleet.orchestrator.handle(&id).unwrap();

    assert!(
        wait_for(SPEC_WAIT, || {
            handle
                .bus
                .find_last(handle.bus.criteria().topic(Topic::CLUSTER_FAILED))
                .ok()
                .flatten()
                .is_some()
        })
        .await
    );

    let failures = handle.bus.query(handle.bus.criteria().topic(Topic::CLUSTER_FAILED)).unwrap();
    assert_eq!(failures.len(), 1, "exactly one CLUSTER_FAILED");
    let payload = zs_core::FailurePayload::from_message(&failures[0]).unwrap();
    assert_eq!(payload.reason, CONDUCTOR_WATCHDOG_REASON);
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_in_time_cancel_the_watchdog() {
    let fleet = Fleet::new();
    fleet.runner.set_fallback(ScriptedRun::completing_with("delegating"));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("orchestrate", BlueprintSource::Inline(conductor_only())))
        .await
        .unwrap();
    let handle = fleet.orchestrator.handle(&id).unwrap();

    // Wait until the conductor has completed (watchdog armed), then feed it
    // an operation chain before the timer runs out.
    assert!(
        wait_for(SPEC_WAIT, || {
            handle
                .bus
                .query(handle.bus.criteria().topic(Topic::AGENT_LIFECYCLE))
                .unwrap()
                .iter()
                .filter_map(zs_core::LifecyclePayload::from_message)
                .any(|p| p.event == zs_core::LifecycleEvent::TaskCompleted)
        })
        .await
    );
    handle
        .bus
        .publish(
            zs_core::MessageDraft::new("CLUSTER_OPERATIONS", "conductor").data(serde_json::json!({
                "operations": [{"action": "publish", "topic": "PLAN_READY", "text": "next"}]
            })),
        )
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

    // Outwait the watchdog window: no failure may appear.
    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    let failures = handle.bus.query(handle.bus.criteria().topic(Topic::CLUSTER_FAILED)).unwrap();
    assert!(failures.is_empty(), "watchdog must have been cancelled: {failures:?}");
}
