// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::EngineConfig;
use std::time::Duration;
use tempfile::TempDir;
use zs_adapters::{FakeProvider, FakeRunner, ScriptedRun};
use zs_blueprint::{CompletionHook, TriggerSpec};
use zs_core::test_support;
use zs_core::ClusterId;
use zs_ledger::{Ledger, MessageQuery};

pub(crate) struct Harness {
    pub _dir: TempDir,
    pub bus: MessageBus<zs_core::SystemClock>,
    pub runner: Arc<FakeRunner>,
    pub deps: AgentDeps<FakeProvider, FakeRunner, zs_core::SystemClock>,
}

pub(crate) fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("agent.db")).unwrap());
    let bus = MessageBus::new(ledger, ClusterId::new("cluster-agent-1"));
    let runner = Arc::new(FakeRunner::new());
    let deps = AgentDeps {
        bus: bus.clone(),
        provider: Arc::new(FakeProvider),
        runner: Arc::clone(&runner),
        config: EngineConfig::for_tests(dir.path()),
        blueprint: Arc::new(Mutex::new(zs_blueprint::Blueprint::default())),
        cwd: None,
        model_override: None,
        container: None,
    };
    Harness { _dir: dir, bus, runner, deps }
}

pub(crate) async fn wait_for(max: Duration, check: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < max {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn count_topic(bus: &MessageBus<zs_core::SystemClock>, topic: &str) -> u64 {
    bus.ledger().count(&MessageQuery::for_cluster(bus.cluster_id().clone()).topic(topic)).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn start_publishes_lifecycle_with_triggers() {
    let h = harness();
    let spec = zs_blueprint::AgentSpec::new("planner", "planning")
        .trigger(TriggerSpec::on("ISSUE_OPENED"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    let started = h
        .bus
        .find_last(h.bus.criteria().topic(Topic::AGENT_LIFECYCLE))
        .unwrap()
        .unwrap();
    let payload = LifecyclePayload::from_message(&started).unwrap();
    assert_eq!(payload.event, LifecycleEvent::Started);
    assert_eq!(payload.agent.as_deref(), Some("planner"));
    assert_eq!(payload.triggers, vec!["ISSUE_OPENED"]);
    assert_eq!(agent.status().phase, AgentPhase::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn trigger_runs_task_and_publishes_completion_batch() {
    let h = harness();
    h.runner.push(ScriptedRun::completing_with("plan written"));

    let spec = zs_blueprint::AgentSpec::new("planner", "planning")
        .trigger(TriggerSpec::on("ISSUE_OPENED"))
        .on_complete(CompletionHook::publish("PLAN_READY"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("ISSUE_OPENED", "orchestrator").text("go")).unwrap();

    assert!(wait_for(Duration::from_secs(5), || count_topic(&h.bus, "PLAN_READY") == 1).await);
    assert_eq!(count_topic(&h.bus, Topic::TOKEN_USAGE), 1);
    assert!(count_topic(&h.bus, Topic::AGENT_OUTPUT) >= 1);

    // Completion hook, token usage, and TASK_COMPLETED are one contiguous
    // batch: no other sender's message interleaves their timestamps.
    let all = h.bus.get_all().unwrap();
    let plan_at = all.iter().position(|m| m.topic == "PLAN_READY").unwrap();
    assert_eq!(all[plan_at + 1].topic.as_str(), Topic::TOKEN_USAGE);
    let completed = LifecyclePayload::from_message(&all[plan_at + 2]).unwrap();
    assert_eq!(completed.event, LifecycleEvent::TaskCompleted);
    assert_eq!(all[plan_at].timestamp + 2, all[plan_at + 2].timestamp);

    // Prompt reached the provider command line.
    let spawned = h.runner.spawned();
    assert_eq!(spawned.len(), 1);
    assert!(spawned[0].args[0].contains("go"));
    assert_eq!(agent.status().iteration, 1);
    assert_eq!(agent.status().phase, AgentPhase::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_task_retries_three_times_with_agent_errors() {
    let h = harness();
    h.runner.set_fallback(ScriptedRun::failing("boom"));

    let spec = zs_blueprint::AgentSpec::new("implementer", "implementation")
        .trigger(TriggerSpec::on("PLAN_READY"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("PLAN_READY", "planner")).unwrap();

    assert!(wait_for(Duration::from_secs(5), || count_topic(&h.bus, Topic::AGENT_ERROR) == 3).await);
    let errors = h.bus.query(h.bus.criteria().topic(Topic::AGENT_ERROR)).unwrap();
    let attempts: Vec<u32> = errors
        .iter()
        .map(|m| zs_core::AgentErrorPayload::from_message(m).unwrap().attempts)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    for msg in &errors {
        let payload = zs_core::AgentErrorPayload::from_message(msg).unwrap();
        assert_eq!(payload.role.as_deref(), Some("implementation"));
        assert!(payload.error.contains("exited with code 1"));
    }
    // No completion was published.
    assert_eq!(count_topic(&h.bus, Topic::TOKEN_USAGE), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_cluster_action_publishes_cluster_complete() {
    let h = harness();
    let spec = zs_blueprint::AgentSpec::new("closer", "orchestration")
        .trigger(TriggerSpec::on("IMPLEMENTATION_READY").stopping());
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("IMPLEMENTATION_READY", "implementer")).unwrap();

    assert!(
        wait_for(Duration::from_secs(5), || count_topic(&h.bus, Topic::CLUSTER_COMPLETE) == 1)
            .await
    );
    // No task ran.
    assert!(h.runner.spawned().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_agent_drops_incoming_triggers() {
    let h = harness();
    h.runner.push(ScriptedRun {
        lines: vec![serde_json::json!({"type": "text", "text": "slow"}).to_string()],
        exit_code: 0,
        delay: Duration::from_millis(300),
    });
    h.runner.set_fallback(ScriptedRun::succeeding(Vec::new()));

    let spec =
        zs_blueprint::AgentSpec::new("worker", "implementation").trigger(TriggerSpec::on("GO*"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("GO_ONE", "other")).unwrap();
    assert!(wait_for(Duration::from_secs(2), || agent.status().phase.is_busy()).await);
    // Arrives mid-task: dropped, not queued.
    h.bus.publish(test_support::draft("GO_TWO", "other")).unwrap();

    assert!(wait_for(Duration::from_secs(5), || agent.status().phase == AgentPhase::Idle).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(agent.status().iteration, 1);
    assert_eq!(h.runner.spawned().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn own_messages_never_trigger() {
    let h = harness();
    let spec = zs_blueprint::AgentSpec::new("echo", "repeat").trigger(TriggerSpec::on("*"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("ANYTHING", "echo")).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(agent.status().iteration, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn directed_messages_skip_other_agents() {
    let h = harness();
    let spec = zs_blueprint::AgentSpec::new("a", "role").trigger(TriggerSpec::on("PING"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("PING", "x").to("someone-else")).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(agent.status().iteration, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_warning_fires_once_per_task_without_killing() {
    let h = harness();
    // Stale threshold from for_tests is 500ms; the run stays silent longer.
    h.runner.push(ScriptedRun {
        lines: vec![serde_json::json!({"type": "text", "text": "late"}).to_string()],
        exit_code: 0,
        delay: Duration::from_millis(1_500),
    });

    let spec = zs_blueprint::AgentSpec::new("slow", "implementation")
        .trigger(TriggerSpec::on("ISSUE_OPENED"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    h.bus.publish(test_support::draft("ISSUE_OPENED", "orchestrator")).unwrap();

    let stale_count = || {
        h.bus
            .query(h.bus.criteria().topic(Topic::AGENT_LIFECYCLE))
            .unwrap()
            .iter()
            .filter_map(LifecyclePayload::from_message)
            .filter(|p| p.event == LifecycleEvent::AgentStaleWarning)
            .count()
    };
    assert!(wait_for(Duration::from_secs(5), || stale_count() >= 1).await);
    // The task still completes: warnings never terminate.
    assert!(wait_for(Duration::from_secs(5), || agent.status().phase == AgentPhase::Idle).await);
    assert_eq!(stale_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_terminates_running_task_and_publishes_stopped() {
    let h = harness();
    h.runner.push(ScriptedRun {
        lines: vec!["never".to_string()],
        exit_code: 0,
        delay: Duration::from_secs(60),
    });

    let spec = zs_blueprint::AgentSpec::new("worker", "implementation")
        .trigger(TriggerSpec::on("ISSUE_OPENED"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;
    h.bus.publish(test_support::draft("ISSUE_OPENED", "orchestrator")).unwrap();
    assert!(wait_for(Duration::from_secs(2), || agent.status().phase.is_busy()).await);

    agent.stop().await;
    assert_eq!(agent.status().phase, AgentPhase::Stopped);

    let stopped = h
        .bus
        .query(h.bus.criteria().topic(Topic::AGENT_LIFECYCLE))
        .unwrap()
        .iter()
        .filter_map(LifecyclePayload::from_message)
        .any(|p| p.event == LifecycleEvent::Stopped);
    assert!(stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_runs_task_with_injected_context() {
    let h = harness();
    h.runner.push(ScriptedRun::completing_with("try again"));

    let spec = zs_blueprint::AgentSpec::new("implementer", "implementation")
        .trigger(TriggerSpec::on("PLAN_READY"));
    let agent = AgentWrapper::new(spec, h.deps.clone());
    agent.start().await;

    agent.resume("Previous failure: boom".to_string(), None).await;
    assert!(wait_for(Duration::from_secs(5), || agent.status().iteration == 1).await);
    assert!(wait_for(Duration::from_secs(5), || !h.runner.spawned().is_empty()).await);
    assert!(h.runner.spawned()[0].args[0].contains("Previous failure: boom"));
}
