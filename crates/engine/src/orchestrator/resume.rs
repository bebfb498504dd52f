// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster resume.
//!
//! A stopped (or zombie) cluster is revived from its registry record: the
//! ledger reopens, agents are rebuilt from the persisted blueprint, and
//! either the failing agent restarts with an error context prompt or the
//! agents whose triggers fire on the last workflow-triggering message wake
//! up again.

use crate::agent::{select_trigger, Agent};
use crate::barrier::InitBarrier;
use crate::orchestrator::{
    build_agents, AgentDepsSeed, ClusterHandle, Control, Orchestrator,
};
use crate::registry::ClusterRecord;
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use zs_adapters::{CommandRunner, Provider};
use zs_blueprint::TriggerAction;
use zs_core::{ClusterId, ClusterState, FailureInfo, Message, MessageDraft, Topic};
use zs_core::payload::FromData;
use zs_ledger::{Ledger, MessageBus, SortOrder};
use crate::error::OrchestratorError;

/// How many recent outputs/validations feed the failure context prompt.
const CONTEXT_TAIL: usize = 10;

impl<P: Provider, R: CommandRunner> Orchestrator<P, R> {
    /// Resume a stopped, failed, or zombie cluster.
    pub async fn resume(&self, id: &ClusterId) -> Result<(), OrchestratorError> {
        let handle = match self.handle(id) {
            Some(handle) if !handle.record.lock().state.is_terminal() => handle,
            _ => self.revive(id).await?,
        };

        let failure = self.resolve_failure(&handle);
        match failure {
            Some(failure) => self.resume_failed_agent(&handle, &failure).await,
            None => self.resume_from_workflow(&handle).await,
        }
    }

    /// Rebuild a live handle from the persisted record.
    async fn revive(&self, id: &ClusterId) -> Result<Arc<ClusterHandle>, OrchestratorError> {
        let map = self.registry.load()?;
        let Some(record) = map.get(id.as_str()).cloned() else {
            return Err(OrchestratorError::UnknownCluster(id.clone()));
        };
        match record.effective_state() {
            ClusterState::Stopped | ClusterState::Failed | ClusterState::Zombie => {}
            other => {
                return Err(OrchestratorError::WrongState {
                    id: id.clone(),
                    state: other.to_string(),
                    expected: "stopped, failed, or zombie",
                })
            }
        }

        let mut record = record;

        // Worktree mode: the checkout must still exist.
        if let Some(worktree) = &record.worktree {
            if !worktree.path.exists() {
                return Err(OrchestratorError::NotResumable {
                    id: id.clone(),
                    reason: format!("worktree {} was deleted", worktree.path.display()),
                });
            }
        }

        // Container mode: recreate the container against the preserved
        // workspace when the old one is gone.
        let mut container = None;
        if let Some(existing) = record.isolation.clone() {
            let backend = Arc::clone(&self.container_backend);
            let live = backend.container_exists(&existing).await;
            let current = if live {
                existing
            } else {
                let workspace = zs_isolation::paths::isolated_dir(id);
                if !workspace.exists() {
                    return Err(OrchestratorError::NotResumable {
                        id: id.clone(),
                        reason: "container and isolated workspace are both gone".to_string(),
                    });
                }
                backend.create_container(id, &existing.image, &workspace).await?
            };
            record.isolation = Some(current.clone());
            container = Some((backend, current));
        }

        let ledger = Arc::new(Ledger::open(self.config.ledger_path(id.as_str()))?);
        let bus = MessageBus::new(Arc::clone(&ledger), id.clone());
        let blueprint = record.blueprint.clone();
        let shared_blueprint = Arc::new(Mutex::new(blueprint.clone()));
        let cwd = record
            .worktree
            .as_ref()
            .map(|w| w.path.clone())
            .or_else(crate::env::cwd_override);

        record.pid = Some(std::process::id());
        record.state = ClusterState::Running;

        let (control_tx, control_rx) = mpsc::unbounded_channel::<Control>();
        let handle = Arc::new(ClusterHandle {
            id: id.clone(),
            ledger,
            bus,
            blueprint: shared_blueprint,
            init: InitBarrier::new(),
            agents: Mutex::new(Vec::new()),
            record: Mutex::new(record.clone()),
            deps_template: AgentDepsSeed {
                cwd,
                model_override: record.model_override.clone(),
                container,
            },
            subs: Mutex::new(Vec::new()),
            watchdog: Default::default(),
            control_tx,
            stopping: AtomicBool::new(false),
        });
        self.clusters.lock().insert(id.as_str().to_string(), Arc::clone(&handle));
        tokio::spawn(self.me().run_control_loop(Arc::clone(&handle), control_rx));

        // Same ordering invariant as start: subscriptions before agents.
        self.register_subscriptions(&handle);

        let deps = self.agent_deps(&handle);
        let agents = build_agents(&blueprint, &deps);
        for agent in &agents {
            agent.start().await;
        }
        *handle.agents.lock() = agents;

        handle.init.resolve();
        self.registry.persist(&record, true)?;
        tracing::info!(cluster = %id, "cluster revived for resume");
        Ok(handle)
    }

    /// The failure to resume from: the record's, or the newest
    /// `AGENT_ERROR` in the ledger.
    fn resolve_failure(&self, handle: &ClusterHandle) -> Option<FailureInfo> {
        if let Some(failure) = handle.record.lock().failure_info.clone() {
            return Some(failure);
        }
        let criteria = handle.bus.criteria().topic(Topic::AGENT_ERROR);
        let last = handle.bus.find_last(criteria).ok().flatten()?;
        let payload = zs_core::AgentErrorPayload::from_message(&last)?;
        Some(FailureInfo {
            agent_id: last.sender.clone(),
            role: payload.role,
            error: payload.error,
            task_id: payload.task_id,
            iteration: payload.iteration,
            failed_at_ms: last.timestamp,
        })
    }

    /// Restart only the failing agent, with a context prompt carrying the
    /// prior error and the recent output tail.
    async fn resume_failed_agent(
        &self,
        handle: &Arc<ClusterHandle>,
        failure: &FailureInfo,
    ) -> Result<(), OrchestratorError> {
        let agent: Option<Arc<dyn Agent>> = handle
            .agents
            .lock()
            .iter()
            .find(|a| a.id() == failure.agent_id)
            .cloned();
        let Some(agent) = agent else {
            return Err(OrchestratorError::NotResumable {
                id: handle.id.clone(),
                reason: format!("failing agent {:?} is not in the blueprint", failure.agent_id),
            });
        };

        let context = self.failure_context(handle, failure)?;
        let message = self.last_workflow_message(handle)?;
        agent.resume(context, message).await;
        tracing::info!(
            cluster = %handle.id,
            agent = %failure.agent_id,
            "resumed failing agent with error context"
        );
        Ok(())
    }

    fn failure_context(
        &self,
        handle: &ClusterHandle,
        failure: &FailureInfo,
    ) -> Result<String, OrchestratorError> {
        let mut recent: Vec<Message> = Vec::new();
        for topic in [Topic::AGENT_OUTPUT, Topic::VALIDATION_RESULT] {
            recent.extend(handle.bus.query(
                handle
                    .bus
                    .criteria()
                    .topic(topic)
                    .order(SortOrder::Desc)
                    .limit(CONTEXT_TAIL as u64),
            )?);
        }
        recent.sort_by_key(|m| std::cmp::Reverse(m.timestamp));
        recent.truncate(CONTEXT_TAIL);
        recent.reverse();

        let mut context = format!(
            "A previous attempt by {} failed with: {}\n",
            failure.agent_id, failure.error
        );
        if !recent.is_empty() {
            context.push_str("\nRecent activity:\n");
            for msg in &recent {
                let line = msg
                    .content
                    .text
                    .clone()
                    .or_else(|| msg.content.data.as_ref().map(|d| d.to_string()))
                    .unwrap_or_default();
                context.push_str(&format!("- [{}] {}\n", msg.sender, line));
            }
        }
        context.push_str("\nPick up where the failed attempt left off.");
        Ok(context)
    }

    /// Wake every agent whose trigger (predicate included) fires on the
    /// last workflow-triggering message; re-bootstrap if only the original
    /// `ISSUE_OPENED` exists.
    async fn resume_from_workflow(
        &self,
        handle: &Arc<ClusterHandle>,
    ) -> Result<(), OrchestratorError> {
        let Some(message) = self.last_workflow_message(handle)? else {
            return Err(OrchestratorError::NotResumable {
                id: handle.id.clone(),
                reason: "no workflow-triggering message in the ledger".to_string(),
            });
        };

        if message.topic == Topic::ISSUE_OPENED {
            // Nothing past bootstrap: re-publish to re-enter the workflow.
            let mut draft = MessageDraft::new(Topic::ISSUE_OPENED, message.sender.clone());
            draft.content = message.content.clone();
            draft.metadata = message.metadata.clone();
            handle.bus.publish(draft)?;
            tracing::info!(cluster = %handle.id, "re-published bootstrap message");
            return Ok(());
        }

        let deps = self.agent_deps(handle);
        let agents: Vec<Arc<dyn Agent>> = handle.agents.lock().clone();
        let mut woke = 0;
        for agent in agents {
            let spec = agent.spec();
            match select_trigger(&spec, &message, &deps) {
                Some(trigger) if trigger.action == TriggerAction::ExecuteTask => {
                    agent.resume(String::new(), Some(message.clone())).await;
                    woke += 1;
                }
                _ => {}
            }
        }
        tracing::info!(cluster = %handle.id, woke, topic = %message.topic, "resumed from workflow message");
        Ok(())
    }

    fn last_workflow_message(
        &self,
        handle: &ClusterHandle,
    ) -> Result<Option<Message>, OrchestratorError> {
        let mut newest: Option<Message> = None;
        for topic in Topic::WORKFLOW_TRIGGERS {
            let found = handle.bus.find_last(handle.bus.criteria().topic(topic))?;
            if let Some(msg) = found {
                if newest.as_ref().map(|n| msg.timestamp > n.timestamp).unwrap_or(true) {
                    newest = Some(msg);
                }
            }
        }
        Ok(newest)
    }
}
