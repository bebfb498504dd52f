// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One provider task run: spawn, stream, publish.

use crate::agent::AgentWrapper;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use zs_adapters::{CommandRunner, Provider, RunningChild, SpawnSpec, StreamEvent, StreamLine};
use zs_blueprint::CompletionHook;
use zs_core::payload::FromData;
use zs_core::{
    AgentErrorPayload, AgentPhase, Clock, LifecycleEvent, Message, MessageDraft, OutputPayload,
    TaskId, TokenUsagePayload, Topic,
};

const MAX_ATTEMPTS: u32 = 3;

/// Pair tool calls with their results in stream order. Results must match
/// the oldest open call; anything else is logged and tolerated.
#[derive(Debug, Default)]
pub(crate) struct ToolPairing {
    open: Vec<String>,
}

impl ToolPairing {
    pub(crate) fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ToolCall { id: Some(id), .. }
            | StreamEvent::ToolStart { id: Some(id), .. } => {
                if !self.open.contains(id) {
                    self.open.push(id.clone());
                }
            }
            StreamEvent::ToolResult { id: Some(id), .. } => {
                match self.open.iter().position(|open| open == id) {
                    Some(0) => {
                        self.open.remove(0);
                    }
                    Some(n) => {
                        tracing::debug!(id = %id, "tool result arrived out of order");
                        self.open.remove(n);
                    }
                    None => tracing::debug!(id = %id, "tool result without a matching call"),
                }
            }
            _ => {}
        }
    }

    pub(crate) fn open_calls(&self) -> usize {
        self.open.len()
    }
}

/// What one child-process run produced.
struct RunOutcome {
    success: bool,
    terminated: bool,
    error: String,
    usage: TokenUsagePayload,
    result_text: Option<String>,
}

/// Run one task (with retries) for a triggering message or a resume
/// context. Publishes every lifecycle transition described in the agent
/// contract. A terminated run means the agent is being stopped: no retry,
/// no error message.
pub(crate) async fn run_task<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    message: Option<&Message>,
    context: Option<&str>,
) {
    let prompt = build_prompt(agent, message, context);

    for attempt in 1..=MAX_ATTEMPTS {
        let outcome = run_once(agent, message, &prompt, attempt).await;
        if outcome.success {
            publish_success(agent, outcome);
            return;
        }
        if outcome.terminated {
            tracing::debug!(agent = %agent.spec_ref().id, "task terminated by stop; not retrying");
            return;
        }
        publish_failure(agent, &outcome, attempt);
        if attempt == MAX_ATTEMPTS {
            tracing::warn!(agent = %agent.spec_ref().id, "task failed after {MAX_ATTEMPTS} attempts");
        }
    }
}

fn build_prompt<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    message: Option<&Message>,
    context: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(context) = context {
        if !context.is_empty() {
            parts.push(context.to_string());
        }
    }
    if let Some(prompt) = &agent.spec_ref().prompt {
        parts.push(prompt.clone());
    }
    if let Some(message) = message {
        if let Some(text) = &message.content.text {
            parts.push(text.clone());
        } else if let Some(data) = &message.content.data {
            parts.push(data.to_string());
        }
    }
    parts.join("\n\n")
}

async fn run_once<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    message: Option<&Message>,
    prompt: &str,
    attempt: u32,
) -> RunOutcome {
    let spec = agent.spec_ref();
    let deps = agent.deps();
    let task_id = TaskId::generate();

    let iteration = {
        let mut state = agent.state_ref().lock();
        state.phase = AgentPhase::ExecutingTask;
        state.iteration += 1;
        state.current_task = Some(task_id);
        state.stale_warned_for = None;
        state.last_output = std::time::Instant::now();
        state.iteration
    };

    let model = deps.model_override.clone().or_else(|| spec.model.clone());

    let mut started = zs_core::LifecyclePayload::new(LifecycleEvent::TaskStarted);
    started.agent = Some(spec.id.clone());
    started.triggered_by = message.map(|m| m.topic.as_str().to_string());
    started.iteration = Some(iteration);
    started.model = model.clone();
    publish(agent, Topic::AGENT_LIFECYCLE, started.to_data());

    let mut assigned = zs_core::LifecyclePayload::new(LifecycleEvent::TaskIdAssigned);
    assigned.agent = Some(spec.id.clone());
    assigned.task_id = Some(task_id.as_str().to_string());
    publish(agent, Topic::AGENT_LIFECYCLE, assigned.to_data());

    let opts = zs_adapters::ProviderOpts {
        model,
        level: None,
        cwd: deps.cwd.clone(),
        env: HashMap::new(),
    };
    let command = deps.provider.build_command(prompt, &opts);
    let timeout = task_timeout(spec.timeout_secs, deps.config.default_task_timeout);

    let spawned = spawn_child(agent, command, timeout).await;
    let mut child = match spawned {
        Ok(child) => child,
        Err(detail) => {
            finish_state(agent);
            return RunOutcome {
                success: false,
                terminated: false,
                error: detail,
                usage: role_usage(spec),
                result_text: None,
            };
        }
    };

    {
        let mut state = agent.state_ref().lock();
        state.pid = child.pid;
        state.child_terminate = Some(child.terminate_token());
    }
    let mut spawned_payload = zs_core::LifecyclePayload::new(LifecycleEvent::ProcessSpawned);
    spawned_payload.agent = Some(spec.id.clone());
    spawned_payload.pid = child.pid;
    publish(agent, Topic::AGENT_LIFECYCLE, spawned_payload.to_data());

    // Stream: parse, pair, publish. Parsing state is scoped to this child.
    let mut pairing = ToolPairing::default();
    let mut usage = role_usage(spec);
    let mut result_text = None;
    let mut result_errored = false;

    while let Some(line) = child.lines.recv().await {
        let events = match &line {
            StreamLine::Stdout(text) => deps.provider.parse_event(text),
            StreamLine::Stderr(text) => vec![StreamEvent::Text { text: text.clone() }],
        };
        for event in events {
            pairing.observe(&event);
            if let Some(sample) = event.usage() {
                usage.input_tokens += sample.input_tokens;
                usage.output_tokens += sample.output_tokens;
                usage.cache_read_input_tokens += sample.cache_read_input_tokens;
                usage.cache_creation_input_tokens += sample.cache_creation_input_tokens;
                usage.total_cost_usd += sample.total_cost_usd;
            }
            if let StreamEvent::Result { text, is_error, .. } = &event {
                result_text = text.clone();
                result_errored = *is_error;
            }

            agent.state_ref().lock().last_output = std::time::Instant::now();
            let payload = OutputPayload {
                line: serde_json::to_value(&event).unwrap_or(serde_json::Value::Null),
                provider: deps.provider.name().to_string(),
                agent: spec.id.clone(),
                role: Some(spec.role.clone()),
                iteration,
            };
            publish(agent, Topic::AGENT_OUTPUT, payload.to_data());
        }
    }

    if pairing.open_calls() > 0 {
        tracing::debug!(agent = %spec.id, open = pairing.open_calls(), "tool calls left unpaired at exit");
    }

    let exit = child.wait().await;
    finish_state(agent);

    let success = exit.success() && !result_errored;
    let error = if exit.timed_out {
        "task timed out".to_string()
    } else if exit.terminated {
        "task terminated".to_string()
    } else if result_errored {
        format!("provider reported an error on attempt {attempt}")
    } else {
        match exit.code {
            Some(code) => format!("provider exited with code {code}"),
            None => "provider exited without a status".to_string(),
        }
    };

    RunOutcome { success, terminated: exit.terminated, error, usage, result_text }
}

async fn spawn_child<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    command: zs_adapters::ProviderCommand,
    timeout: Option<Duration>,
) -> Result<RunningChild, String> {
    let deps = agent.deps();
    match &deps.container {
        // Container mode: re-route through the isolation backend so the
        // provider executes inside the cluster's container.
        Some((backend, record)) => {
            let mut argv = vec![command.binary];
            argv.extend(command.args);
            backend
                .spawn_in_container(record, &argv, &command.env, timeout)
                .await
                .map_err(|e| e.to_string())
        }
        None => {
            let spec = SpawnSpec {
                binary: command.binary,
                args: command.args,
                env: command.env,
                cwd: deps.cwd.clone(),
                timeout,
            };
            deps.runner.spawn(spec).await.map_err(|e| e.to_string())
        }
    }
}

fn task_timeout(timeout_secs: Option<u64>, default: Duration) -> Option<Duration> {
    match timeout_secs {
        // Zero is the distinguished "infinite" value; the validator only
        // admits it on stop_cluster watchers.
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(default),
    }
}

fn role_usage(spec: &zs_blueprint::AgentSpec) -> TokenUsagePayload {
    TokenUsagePayload { role: spec.role.clone(), ..Default::default() }
}

fn finish_state<P: Provider, R: CommandRunner, C: Clock>(agent: &AgentWrapper<P, R, C>) {
    let mut state = agent.state_ref().lock();
    // A concurrent stop() already moved the phase to Stopped; keep it.
    if state.phase == AgentPhase::ExecutingTask {
        state.phase = AgentPhase::Idle;
    }
    state.pid = None;
    state.child_terminate = None;
}

/// Completion hook, token usage, and TASK_COMPLETED go out as one atomic
/// batch: no other sender's messages may interleave them.
fn publish_success<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    outcome: RunOutcome,
) {
    let spec = agent.spec_ref();
    let iteration = agent.state_ref().lock().iteration;
    let mut batch = Vec::new();

    if let Some(hook) = &spec.hooks.on_complete {
        batch.push(completion_draft(spec, hook, outcome.result_text.as_deref(), iteration));
    }
    batch.push(
        MessageDraft::new(Topic::TOKEN_USAGE, spec.id.clone()).data(outcome.usage.to_data()),
    );
    let mut completed = zs_core::LifecyclePayload::new(LifecycleEvent::TaskCompleted);
    completed.agent = Some(spec.id.clone());
    completed.iteration = Some(iteration);
    batch.push(MessageDraft::new(Topic::AGENT_LIFECYCLE, spec.id.clone()).data(completed.to_data()));

    if let Err(e) = agent.deps().bus.publish_batch(batch) {
        tracing::warn!(agent = %spec.id, error = %e, "completion batch publish failed");
    }
}

fn completion_draft(
    spec: &zs_blueprint::AgentSpec,
    hook: &CompletionHook,
    result_text: Option<&str>,
    iteration: u32,
) -> MessageDraft {
    let text = hook
        .text
        .clone()
        .or_else(|| result_text.map(String::from))
        .unwrap_or_else(|| format!("{} completed iteration {iteration}", spec.id));
    let data = hook
        .data
        .clone()
        .unwrap_or_else(|| json!({ "agent": spec.id, "iteration": iteration }));
    MessageDraft::new(Topic::new(&hook.topic), spec.id.clone()).text(text).data(data)
}

fn publish_failure<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    outcome: &RunOutcome,
    attempt: u32,
) {
    let spec = agent.spec_ref();
    let (iteration, task_id) = {
        let state = agent.state_ref().lock();
        (state.iteration, state.current_task)
    };

    let mut failed = zs_core::LifecyclePayload::new(LifecycleEvent::TaskFailed);
    failed.agent = Some(spec.id.clone());
    failed.iteration = Some(iteration);
    failed.task_id = task_id.map(|t| t.as_str().to_string());
    publish(agent, Topic::AGENT_LIFECYCLE, failed.to_data());

    let error = AgentErrorPayload {
        attempts: attempt,
        error: outcome.error.clone(),
        task_id: task_id.map(|t| t.as_str().to_string()),
        iteration,
        role: Some(spec.role.clone()),
    };
    publish(agent, Topic::AGENT_ERROR, error.to_data());
}

fn publish<P: Provider, R: CommandRunner, C: Clock>(
    agent: &AgentWrapper<P, R, C>,
    topic: &str,
    data: serde_json::Value,
) {
    let draft = MessageDraft::new(Topic::new(topic), agent.spec_ref().id.clone()).data(data);
    if let Err(e) = agent.deps().bus.publish(draft) {
        tracing::warn!(agent = %agent.spec_ref().id, topic, error = %e, "publish failed");
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
