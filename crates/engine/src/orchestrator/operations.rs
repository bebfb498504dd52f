// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation-chain handling: schema-validated self-mutation of a running
//! cluster's topology.
//!
//! Every chain answers with exactly one of `CLUSTER_OPERATIONS_SUCCESS`,
//! `CLUSTER_OPERATIONS_VALIDATION_FAILED` (nothing mutated), or
//! `CLUSTER_OPERATIONS_FAILED` (runtime failure; the cluster is stopped).

use crate::agent::Agent;
use crate::orchestrator::{build_agents, ClusterHandle, Orchestrator};
use std::sync::Arc;
use zs_adapters::{CommandRunner, Provider};
use zs_blueprint::{AgentSpec, Blueprint, Operation, OperationChain};
use zs_core::{Message, MessageDraft, Topic, SENDER_ORCHESTRATOR};

impl<P: Provider, R: CommandRunner> Orchestrator<P, R> {
    pub(crate) async fn handle_operations(&self, handle: &Arc<ClusterHandle>, msg: &Message) {
        let Some(data) = &msg.content.data else {
            self.reject(handle, "operation chain carries no data");
            return;
        };

        // Structural validation: actions present and in the closed set.
        let chain = match OperationChain::parse(data) {
            Ok(chain) => chain,
            Err(problem) => {
                self.reject(handle, &problem);
                return;
            }
        };

        // Project and validate the post-operation topology before touching
        // anything.
        let current = handle.blueprint.lock().clone();
        let proposed = match chain.proposed(&current, &self.templates) {
            Ok(proposed) => proposed,
            Err(e) => {
                self.reject(handle, &e.to_string());
                return;
            }
        };
        if let Err(e) = zs_blueprint::validate(&proposed) {
            self.reject(handle, &e.to_string());
            return;
        }

        // Predicates evaluated by agents spawned mid-chain see the final
        // graph.
        *handle.blueprint.lock() = proposed.clone();

        if let Err(problem) = self.execute_chain(handle, &chain).await {
            tracing::error!(cluster = %handle.id, error = %problem, "operation chain failed at runtime");
            self.publish_result(
                handle,
                Topic::CLUSTER_OPERATIONS_FAILED,
                serde_json::json!({ "error": problem }),
            );
            if let Err(e) = self.stop(&handle.id).await {
                tracing::error!(cluster = %handle.id, error = %e, "stop after failed operation chain failed");
            }
            return;
        }

        // The persisted record carries the resolved graph too; resume
        // rebuilds agents from it, so a chain must survive stop+resume.
        {
            let mut record = handle.record.lock();
            record.blueprint = proposed;
            if let Err(e) = self.registry.persist(&record, false) {
                tracing::warn!(cluster = %handle.id, error = %e, "post-chain registry persist failed");
            }
        }

        self.publish_result(
            handle,
            Topic::CLUSTER_OPERATIONS_SUCCESS,
            serde_json::json!({ "operations": chain.operations.len() }),
        );
    }

    async fn execute_chain(
        &self,
        handle: &Arc<ClusterHandle>,
        chain: &OperationChain,
    ) -> Result<(), String> {
        for operation in &chain.operations {
            match operation {
                Operation::AddAgents { agents } => {
                    self.spawn_agents(handle, agents).await;
                }
                Operation::RemoveAgents { ids } => {
                    let removed: Vec<Arc<dyn Agent>> = {
                        let mut live = handle.agents.lock();
                        let (keep, drop): (Vec<Arc<dyn Agent>>, Vec<Arc<dyn Agent>>) = live
                            .drain(..)
                            .partition(|a| !ids.iter().any(|id| id == a.id()));
                        *live = keep;
                        drop
                    };
                    for agent in removed {
                        agent.stop().await;
                    }
                }
                Operation::UpdateAgent { id, patch } => {
                    let old: Option<Arc<dyn Agent>> = {
                        let mut live = handle.agents.lock();
                        live.iter()
                            .position(|a| a.id() == *id)
                            .map(|at| live.remove(at))
                    };
                    let Some(old) = old else {
                        return Err(format!("update_agent targets unknown agent {id:?}"));
                    };
                    let mut spec = old.spec();
                    old.stop().await;
                    patch.apply(&mut spec);
                    self.spawn_agents(handle, std::slice::from_ref(&spec)).await;
                }
                Operation::Publish { topic, text, data, receiver } => {
                    let mut draft = MessageDraft::new(Topic::new(topic), SENDER_ORCHESTRATOR);
                    if let Some(text) = text {
                        draft = draft.text(text.clone());
                    }
                    if let Some(data) = data {
                        draft = draft.data(data.clone());
                    }
                    if let Some(receiver) = receiver {
                        draft = draft.to(receiver.clone());
                    }
                    handle.bus.publish(draft).map_err(|e| e.to_string())?;
                }
                Operation::LoadConfig { config } => {
                    let resolved =
                        self.templates.resolve(config).map_err(|e| e.to_string())?;
                    self.spawn_agents(handle, &resolved.agents).await;
                }
            }
        }
        Ok(())
    }

    /// Build, start, and register freshly added agents, propagating cwd,
    /// model override, and the isolation handle.
    async fn spawn_agents(&self, handle: &Arc<ClusterHandle>, specs: &[AgentSpec]) {
        let deps = self.agent_deps(handle);
        let agents = build_agents(&Blueprint { agents: specs.to_vec() }, &deps);
        for agent in &agents {
            agent.start().await;
        }
        handle.agents.lock().extend(agents);
    }

    fn reject(&self, handle: &Arc<ClusterHandle>, problem: &str) {
        tracing::warn!(cluster = %handle.id, problem, "operation chain rejected");
        self.publish_result(
            handle,
            Topic::CLUSTER_OPERATIONS_VALIDATION_FAILED,
            serde_json::json!({ "error": problem }),
        );
    }

    fn publish_result(&self, handle: &Arc<ClusterHandle>, topic: &str, data: serde_json::Value) {
        let draft = MessageDraft::new(Topic::new(topic), SENDER_ORCHESTRATOR).data(data);
        if let Err(e) = handle.bus.publish(draft) {
            tracing::warn!(cluster = %handle.id, error = %e, "operation result publish failed");
        }
    }
}
