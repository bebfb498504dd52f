// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sub-cluster wrapper: an agent-shaped entry whose body is a nested
//! cluster.
//!
//! The first triggering message instantiates the child cluster with its own
//! private ledger and bus, bridges a configurable set of topics in each
//! direction, and bootstraps the child with an `ISSUE_OPENED` carrying the
//! triggering text. When the child reaches a terminal topic the wrapper
//! publishes its completion hook on the parent bus and returns to idle.

use crate::agent::{Agent, AgentDeps};
use crate::orchestrator::build_agents;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zs_adapters::{CommandRunner, Provider};
use zs_blueprint::{AgentSpec, Blueprint};
use zs_core::{
    AgentPhase, AgentStatus, Clock, ClusterId, Message, MessageDraft, SystemClock, Topic,
};
use zs_ledger::{Ledger, MessageBus, Subscription};

/// Metadata flag marking a bridged copy, so it is never re-forwarded.
const BRIDGED_FLAG: &str = "bridged";

// Child clusters always run on the system clock; the parent's clock
// genericity stays at the parent boundary.
struct ChildCluster {
    id: ClusterId,
    ledger: Arc<Ledger<SystemClock>>,
    bus: MessageBus<SystemClock>,
    agents: Vec<Arc<dyn Agent>>,
    _bridge_subs: Vec<Subscription>,
}

enum Work {
    Trigger(Message),
    ChildTerminal(Topic),
}

pub struct SubClusterWrapper<P: Provider, R: CommandRunner, C: Clock> {
    spec: AgentSpec,
    parent: AgentDeps<P, R, C>,
    phase: Arc<Mutex<AgentPhase>>,
    iteration: Arc<Mutex<u32>>,
    child: tokio::sync::Mutex<Option<ChildCluster>>,
    subs: Mutex<Vec<Subscription>>,
    work_tx: mpsc::UnboundedSender<Work>,
    work_rx: Mutex<Option<mpsc::UnboundedReceiver<Work>>>,
    cancel: CancellationToken,
    weak_self: Weak<Self>,
}

impl<P: Provider, R: CommandRunner, C: Clock> SubClusterWrapper<P, R, C> {
    pub fn new(spec: AgentSpec, parent: AgentDeps<P, R, C>) -> Arc<Self> {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|weak| Self {
            spec,
            parent,
            phase: Arc::new(Mutex::new(AgentPhase::Idle)),
            iteration: Arc::new(Mutex::new(0)),
            child: tokio::sync::Mutex::new(None),
            subs: Mutex::new(Vec::new()),
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            cancel: CancellationToken::new(),
            weak_self: weak.clone(),
        })
    }

    fn child_cluster_id(&self) -> ClusterId {
        ClusterId::new(format!("{}-sub-{}", self.parent.bus.cluster_id(), self.spec.id))
    }

    async fn ensure_child(self: &Arc<Self>) -> Option<()> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Some(());
        }

        let child_id = self.child_cluster_id();
        let path = self.parent.config.ledger_path(child_id.as_str());
        let ledger = match Ledger::open(&path) {
            Ok(ledger) => Arc::new(ledger),
            Err(e) => {
                tracing::error!(cluster = %child_id, error = %e, "sub-cluster ledger open failed");
                return None;
            }
        };

        let bus = MessageBus::new(Arc::clone(&ledger), child_id.clone());
        let config = self
            .spec
            .config
            .as_deref()
            .cloned()
            .unwrap_or_else(Blueprint::default);
        let child_blueprint = Arc::new(Mutex::new(config.clone()));

        let deps: AgentDeps<P, R, SystemClock> = AgentDeps {
            bus: bus.clone(),
            provider: Arc::clone(&self.parent.provider),
            runner: Arc::clone(&self.parent.runner),
            config: self.parent.config.clone(),
            blueprint: child_blueprint,
            cwd: self.parent.cwd.clone(),
            model_override: self.parent.model_override.clone(),
            container: self.parent.container.clone(),
        };

        let mut bridge_subs = Vec::new();

        // Child terminal topics wake the worker to finish the iteration.
        for topic in [Topic::CLUSTER_COMPLETE, Topic::CLUSTER_FAILED] {
            let work_tx = self.work_tx.clone();
            let child_scope = child_id.clone();
            bridge_subs.push(bus.subscribe_topic(topic, move |msg| {
                if msg.cluster_id == child_scope {
                    let _ = work_tx.send(Work::ChildTerminal(msg.topic.clone()));
                }
            }));
        }

        // Child → parent: configured topics surface on the parent bus.
        for topic in &self.spec.expose_topics {
            let parent_bus = self.parent.bus.clone();
            let child_scope = child_id.clone();
            bridge_subs.push(bus.subscribe_topic(topic.as_str(), move |msg| {
                if msg.cluster_id != child_scope || is_bridged(msg) {
                    return;
                }
                let _ = parent_bus.publish(bridged_copy(msg));
            }));
        }

        // Parent → child: configured topics flow into the child bus.
        for topic in &self.spec.forward_topics {
            let child_bus = bus.clone();
            let parent_scope = self.parent.bus.cluster_id().clone();
            bridge_subs.push(self.parent.bus.subscribe_topic(topic.as_str(), move |msg| {
                if msg.cluster_id != parent_scope || is_bridged(msg) {
                    return;
                }
                let _ = child_bus.publish(bridged_copy(msg));
            }));
        }

        let agents = build_agents(&config, &deps);
        for agent in &agents {
            agent.start().await;
        }

        *slot = Some(ChildCluster { id: child_id, ledger, bus, agents, _bridge_subs: bridge_subs });
        Some(())
    }

    async fn handle_trigger(self: &Arc<Self>, message: Message) {
        if self.phase.lock().is_busy() {
            tracing::debug!(agent = %self.spec.id, "sub-cluster busy; dropping trigger");
            return;
        }
        if crate::agent::select_trigger(&self.spec, &message, &self.parent).is_none() {
            return;
        }
        if self.ensure_child().await.is_none() {
            return;
        }
        *self.phase.lock() = AgentPhase::ExecutingTask;
        *self.iteration.lock() += 1;

        let slot = self.child.lock().await;
        if let Some(child) = slot.as_ref() {
            let text = message
                .content
                .text
                .clone()
                .unwrap_or_else(|| format!("triggered by {}", message.topic));
            let draft = MessageDraft::new(Topic::ISSUE_OPENED, zs_core::SENDER_ORCHESTRATOR)
                .text(text)
                .metadata(serde_json::json!({ "parentTopic": message.topic.as_str() }));
            if let Err(e) = child.bus.publish(draft) {
                tracing::warn!(cluster = %child.id, error = %e, "sub-cluster bootstrap publish failed");
            }
        }
    }

    async fn handle_child_terminal(self: &Arc<Self>, topic: Topic) {
        // Tear the child down completely; a later trigger builds a fresh
        // one over the same ledger file.
        {
            let mut slot = self.child.lock().await;
            if let Some(child) = slot.take() {
                for agent in &child.agents {
                    agent.stop().await;
                }
                child.ledger.close();
            }
        }
        *self.phase.lock() = AgentPhase::Idle;

        if let Some(hook) = &self.spec.hooks.on_complete {
            let iteration = *self.iteration.lock();
            let text = hook
                .text
                .clone()
                .unwrap_or_else(|| format!("sub-cluster {} finished ({topic})", self.spec.id));
            let data = hook.data.clone().unwrap_or_else(|| {
                serde_json::json!({ "agent": self.spec.id, "iteration": iteration, "terminal": topic.as_str() })
            });
            let draft = MessageDraft::new(Topic::new(&hook.topic), self.spec.id.clone())
                .text(text)
                .data(data);
            if let Err(e) = self.parent.bus.publish(draft) {
                tracing::warn!(agent = %self.spec.id, error = %e, "sub-cluster completion publish failed");
            }
        }
    }

    async fn run_worker(self: Arc<Self>, mut work_rx: mpsc::UnboundedReceiver<Work>) {
        loop {
            let work = tokio::select! {
                _ = self.cancel.cancelled() => break,
                work = work_rx.recv() => match work {
                    Some(work) => work,
                    None => break,
                },
            };
            match work {
                Work::Trigger(message) => self.handle_trigger(message).await,
                Work::ChildTerminal(topic) => self.handle_child_terminal(topic).await,
            }
        }
    }
}

fn is_bridged(msg: &Message) -> bool {
    msg.metadata
        .as_ref()
        .and_then(|m| m.get(BRIDGED_FLAG))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn bridged_copy(msg: &Message) -> MessageDraft {
    let mut draft = MessageDraft::new(msg.topic.clone(), msg.sender.clone());
    draft.receiver = msg.receiver.clone();
    draft.content = msg.content.clone();
    let mut metadata = msg
        .metadata
        .clone()
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    if let Some(map) = metadata.as_object_mut() {
        map.insert(BRIDGED_FLAG.to_string(), serde_json::Value::Bool(true));
    }
    draft.metadata = Some(metadata);
    draft
}

#[async_trait]
impl<P: Provider, R: CommandRunner, C: Clock> Agent for SubClusterWrapper<P, R, C> {
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
        let Some(me) = self.weak_self.upgrade() else { return };

        let agent_id = self.spec.id.clone();
        let cluster_id = self.parent.bus.cluster_id().clone();
        let trigger_topics: Vec<String> =
            self.spec.triggers.iter().map(|t| t.topic.clone()).collect();
        let work_tx = self.work_tx.clone();
        let sub = self.parent.bus.subscribe(move |msg| {
            if msg.cluster_id != cluster_id || msg.sender == agent_id {
                return;
            }
            if !msg.addressed_to(&agent_id) {
                return;
            }
            if trigger_topics.iter().any(|pattern| msg.topic.matches(pattern)) {
                let _ = work_tx.send(Work::Trigger(msg.clone()));
            }
        });
        self.subs.lock().push(sub);

        tokio::spawn(me.run_worker(work_rx));
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.subs.lock().clear();
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.take() {
            // Recursive stop: nested sub-clusters stop their own children.
            for agent in &child.agents {
                agent.stop().await;
            }
            child.ledger.close();
        }
        *self.phase.lock() = AgentPhase::Stopped;
    }

    async fn resume(&self, _context: String, message: Option<Message>) {
        if let Some(message) = message {
            let _ = self.work_tx.send(Work::Trigger(message));
        }
    }

    fn status(&self) -> AgentStatus {
        AgentStatus {
            id: self.spec.id.clone(),
            role: self.spec.role.clone(),
            phase: *self.phase.lock(),
            iteration: *self.iteration.lock(),
            current_task_id: None,
            process_pid: None,
            model: self.spec.model.clone(),
        }
    }
}

#[cfg(test)]
#[path = "subcluster_tests.rs"]
mod tests;
