// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One supervised agent.
//!
//! The wrapper subscribes to its triggers, waits for a matching message,
//! runs one provider task, streams parsed output back to the log, publishes
//! lifecycle transitions and a completion (or error) message, and loops
//! back to waiting. Messages arriving while a task is executing are
//! dropped: an agent only listens while idle.

mod task;
mod triggers;

pub use triggers::LiveHost;
pub(crate) use triggers::select_trigger;

use crate::config::EngineConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zs_adapters::{CommandRunner, Provider};
use zs_blueprint::{AgentSpec, Blueprint, TriggerAction};
use zs_core::payload::FromData;
use zs_core::{
    AgentPhase, AgentStatus, Clock, LifecycleEvent, LifecyclePayload, Message, MessageDraft,
    TaskId, Topic,
};
use zs_isolation::ContainerBackend;
use zs_ledger::{MessageBus, Subscription};

/// Common contract of plain agents and sub-cluster wrappers.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn id(&self) -> &str;
    fn role(&self) -> &str;
    fn spec(&self) -> AgentSpec;
    async fn start(&self);
    async fn stop(&self);
    /// Externally injected prompt prefix; runs one task immediately.
    async fn resume(&self, context: String, message: Option<Message>);
    fn status(&self) -> AgentStatus;
}

/// Shared wiring handed to every agent in a cluster.
pub struct AgentDeps<P, R, C: Clock> {
    pub bus: MessageBus<C>,
    pub provider: Arc<P>,
    pub runner: Arc<R>,
    pub config: EngineConfig,
    /// Live agent graph, shared with the orchestrator for predicate lookups.
    pub blueprint: Arc<Mutex<Blueprint>>,
    pub cwd: Option<PathBuf>,
    pub model_override: Option<String>,
    /// Present in container mode: commands are routed through the backend.
    pub container: Option<(Arc<ContainerBackend>, zs_core::ContainerRecord)>,
}

impl<P, R, C: Clock> Clone for AgentDeps<P, R, C> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            provider: Arc::clone(&self.provider),
            runner: Arc::clone(&self.runner),
            config: self.config.clone(),
            blueprint: Arc::clone(&self.blueprint),
            cwd: self.cwd.clone(),
            model_override: self.model_override.clone(),
            container: self.container.clone(),
        }
    }
}

pub(crate) struct RuntimeState {
    pub phase: AgentPhase,
    pub iteration: u32,
    pub current_task: Option<TaskId>,
    pub pid: Option<u32>,
    pub last_output: Instant,
    pub stale_warned_for: Option<TaskId>,
    pub child_terminate: Option<CancellationToken>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            phase: AgentPhase::Idle,
            iteration: 0,
            current_task: None,
            pid: None,
            last_output: Instant::now(),
            stale_warned_for: None,
            child_terminate: None,
        }
    }
}

pub(crate) struct WorkItem {
    pub message: Option<Message>,
    pub context: Option<String>,
}

/// A plain (non-subcluster) supervised agent.
pub struct AgentWrapper<P: Provider, R: CommandRunner, C: Clock> {
    spec: AgentSpec,
    deps: AgentDeps<P, R, C>,
    state: Arc<Mutex<RuntimeState>>,
    subs: Mutex<Vec<Subscription>>,
    work_tx: mpsc::UnboundedSender<WorkItem>,
    work_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkItem>>>,
    cancel: CancellationToken,
    weak_self: std::sync::Weak<Self>,
}

impl<P: Provider, R: CommandRunner, C: Clock> AgentWrapper<P, R, C> {
    pub fn new(spec: AgentSpec, deps: AgentDeps<P, R, C>) -> Arc<Self> {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|weak| Self {
            spec,
            deps,
            state: Arc::new(Mutex::new(RuntimeState::new())),
            subs: Mutex::new(Vec::new()),
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            cancel: CancellationToken::new(),
            weak_self: weak.clone(),
        })
    }

    fn publish_lifecycle(&self, payload: LifecyclePayload) {
        let draft = MessageDraft::new(Topic::AGENT_LIFECYCLE, self.spec.id.clone())
            .data(payload.to_data());
        if let Err(e) = self.deps.bus.publish(draft) {
            tracing::warn!(agent = %self.spec.id, error = %e, "lifecycle publish failed");
        }
    }

    fn lifecycle(&self, event: LifecycleEvent) -> LifecyclePayload {
        let mut payload = LifecyclePayload::new(event);
        payload.agent = Some(self.spec.id.clone());
        payload
    }

    /// Worker loop: predicates, actions, and task runs all happen here so
    /// ledger signal callbacks stay cheap and never publish.
    async fn run_worker(self: Arc<Self>, mut work_rx: mpsc::UnboundedReceiver<WorkItem>) {
        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = work_rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            match item {
                // Resume path: the orchestrator already decided this agent
                // runs; no trigger re-evaluation.
                WorkItem { message, context: Some(context) } => {
                    task::run_task(&self, message.as_ref(), Some(&context)).await;
                }
                WorkItem { message: Some(message), context: None } => {
                    let Some(trigger) = triggers::select_trigger(&self.spec, &message, &self.deps)
                    else {
                        continue;
                    };
                    match trigger.action {
                        TriggerAction::StopCluster => {
                            tracing::info!(
                                agent = %self.spec.id,
                                topic = %message.topic,
                                "stop condition met"
                            );
                            let draft =
                                MessageDraft::new(Topic::CLUSTER_COMPLETE, self.spec.id.clone())
                                    .text(format!("stop condition met on {}", message.topic))
                                    .data(serde_json::json!({
                                        "triggeredBy": message.topic.as_str(),
                                    }));
                            if let Err(e) = self.deps.bus.publish(draft) {
                                tracing::warn!(agent = %self.spec.id, error = %e, "CLUSTER_COMPLETE publish failed");
                            }
                        }
                        TriggerAction::ExecuteTask => {
                            task::run_task(&self, Some(&message), None).await;
                        }
                    }
                }
                WorkItem { message: None, context: None } => {}
            }
        }
    }

    async fn run_stale_watchdog(self: Arc<Self>) {
        let threshold = self.deps.config.stale_after;
        let tick = (threshold / 4).max(std::time::Duration::from_millis(50));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let warn = {
                let mut state = self.state.lock();
                if state.phase != AgentPhase::ExecutingTask {
                    None
                } else if state.last_output.elapsed() < threshold {
                    None
                } else if state.stale_warned_for == state.current_task {
                    None
                } else {
                    state.stale_warned_for = state.current_task;
                    Some(state.last_output.elapsed())
                }
            };
            // Warning only: termination is reserved for an explicit
            // stale-restart requested by the operator.
            if let Some(silence) = warn {
                let mut payload = self.lifecycle(LifecycleEvent::AgentStaleWarning);
                payload.time_since_last_output_ms = Some(silence.as_millis() as u64);
                payload.analysis =
                    Some("no output past the stale threshold; task left running".to_string());
                self.publish_lifecycle(payload);
            }
        }
    }
}

#[async_trait]
impl<P: Provider, R: CommandRunner, C: Clock> Agent for AgentWrapper<P, R, C> {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn role(&self) -> &str {
        &self.spec.role
    }

    fn spec(&self) -> AgentSpec {
        self.spec.clone()
    }

    async fn start(&self) {
        let Some(work_rx) = self.work_rx.lock().take() else {
            tracing::warn!(agent = %self.spec.id, "start called twice");
            return;
        };

        // One generic subscription filtered here covers exact, "*", and
        // prefix patterns alike. The callback only enqueues: predicates and
        // publishes happen in the worker, off the signal path.
        let me: Arc<Self> = match self.self_arc() {
            Some(me) => me,
            None => return,
        };
        let agent_id = self.spec.id.clone();
        let cluster_id = self.deps.bus.cluster_id().clone();
        let trigger_topics: Vec<String> =
            self.spec.triggers.iter().map(|t| t.topic.clone()).collect();
        let state = Arc::clone(&self.state);
        let work_tx = self.work_tx.clone();
        let sub = self.deps.bus.subscribe(move |msg| {
            if msg.cluster_id != cluster_id || msg.sender == agent_id {
                return;
            }
            if !msg.addressed_to(&agent_id) {
                return;
            }
            if !trigger_topics.iter().any(|pattern| msg.topic.matches(pattern)) {
                return;
            }
            if state.lock().phase.is_busy() {
                tracing::debug!(agent = %agent_id, topic = %msg.topic, "busy; dropping trigger");
                return;
            }
            let _ = work_tx.send(WorkItem { message: Some(msg.clone()), context: None });
        });
        self.subs.lock().push(sub);

        let mut payload = self.lifecycle(LifecycleEvent::Started);
        payload.triggers = self.spec.triggers.iter().map(|t| t.topic.clone()).collect();
        self.publish_lifecycle(payload);

        tokio::spawn(Arc::clone(&me).run_worker(work_rx));
        tokio::spawn(me.run_stale_watchdog());
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.subs.lock().clear();
        let child = {
            let mut state = self.state.lock();
            state.phase = AgentPhase::Stopped;
            state.child_terminate.take()
        };
        if let Some(child) = child {
            child.cancel();
        }
        // Best effort: the ledger may already be closed during teardown.
        self.publish_lifecycle(self.lifecycle(LifecycleEvent::Stopped));
    }

    async fn resume(&self, context: String, message: Option<Message>) {
        let _ = self.work_tx.send(WorkItem { message, context: Some(context) });
    }

    fn status(&self) -> AgentStatus {
        let state = self.state.lock();
        AgentStatus {
            id: self.spec.id.clone(),
            role: self.spec.role.clone(),
            phase: state.phase,
            iteration: state.iteration,
            current_task_id: state.current_task,
            process_pid: state.pid,
            model: self.deps.model_override.clone().or_else(|| self.spec.model.clone()),
        }
    }
}

impl<P: Provider, R: CommandRunner, C: Clock> AgentWrapper<P, R, C> {
    pub(crate) fn deps(&self) -> &AgentDeps<P, R, C> {
        &self.deps
    }

    pub(crate) fn spec_ref(&self) -> &AgentSpec {
        &self.spec
    }

    pub(crate) fn state_ref(&self) -> &Arc<Mutex<RuntimeState>> {
        &self.state
    }

    /// Upgrade `&self` back to the owning `Arc`. Wrappers are only ever
    /// constructed via [`AgentWrapper::new`], which returns an `Arc`.
    fn self_arc(&self) -> Option<Arc<Self>> {
        self.weak_self.upgrade()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
