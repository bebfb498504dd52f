// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume scenarios.

use crate::specs::prelude::*;
use zs_core::ClusterState;
use zs_engine::{BlueprintSource, OrchestratorError, StartOptions};

#[tokio::test(flavor = "multi_thread")]
async fn resume_after_failure_restarts_only_the_implementer() {
    let fleet = Fleet::new();
    fleet.runner.push(ScriptedRun::completing_with("the plan"));
    fleet.runner.set_fallback(ScriptedRun::failing("segfault"));

    let id = fleet
        .orchestrator
        .start(StartOptions::prompt(
            "Build the feature",
            BlueprintSource::Inline(three_stage_pipeline()),
        ))
        .await
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT, || fleet.registry_state(&id) == Some(ClusterState::Stopped)).await
    );
    let spawned_before = fleet.runner.spawned().len();
    // 1 planner run + 3 implementer attempts.
    assert_eq!(spawned_before, 4);

    fleet.runner.push(ScriptedRun::completing_with("fixed implementation"));
    fleet.orchestrator.resume(&id).await.unwrap();

    assert!(wait_for(SPEC_WAIT, || fleet.runner.spawned().len() > spawned_before).await);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    // Exactly one new run, and it carries the failure context.
    let spawned = fleet.runner.spawned();
    assert_eq!(spawned.len(), spawned_before + 1);
    let prompt = &spawned[spawned_before].args[0];
    assert!(prompt.contains("segfault"), "prior error must be injected: {prompt}");
    assert!(prompt.contains("Recent activity"));

    // The context tail is bounded.
    let bullet_lines = prompt.lines().filter(|l| l.starts_with("- [")).count();
    assert!(bullet_lines <= 10, "at most ten prior outputs, got {bullet_lines}");
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_of_a_missing_cluster_is_an_error() {
    let fleet = Fleet::new();
    let err = fleet.orchestrator.resume(&ClusterId::new("cluster-ghost-1")).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::UnknownCluster(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_with_only_a_bootstrap_republishes_it() {
    let fleet = Fleet::new();
    // Nobody listens on ISSUE_OPENED: the bootstrap is the only workflow
    // message ever appended.
    let blueprint = zs_blueprint::Blueprint {
        agents: vec![zs_blueprint::AgentSpec::new("watcher", "observer")
            .trigger(zs_blueprint::TriggerSpec::on("NEVER_SENT"))],
    };
    let id = fleet
        .orchestrator
        .start(StartOptions::prompt("lonely", BlueprintSource::Inline(blueprint)))
        .await
        .unwrap();
    fleet.orchestrator.stop(&id).await.unwrap();

    fleet.orchestrator.resume(&id).await.unwrap();

    let handle = fleet.orchestrator.handle(&id).unwrap();
    assert!(
        wait_for(SPEC_WAIT, || {
            handle
                .bus
                .query(handle.bus.criteria().topic(Topic::ISSUE_OPENED))
                .map(|msgs| msgs.len() == 2)
                .unwrap_or(false)
        })
        .await,
        "bootstrap must be re-published"
    );
    let msgs = handle.bus.query(handle.bus.criteria().topic(Topic::ISSUE_OPENED)).unwrap();
    assert_eq!(msgs[0].content.text, msgs[1].content.text);
}
