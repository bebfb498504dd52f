// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cluster orchestrator.

mod operations;
mod resume;
mod watchdog;

pub use watchdog::CONDUCTOR_WATCHDOG_REASON;

use crate::agent::{Agent, AgentDeps, AgentWrapper};
use crate::barrier::InitBarrier;
use crate::config::EngineConfig;
use crate::error::OrchestratorError;
use crate::registry::{ClusterRecord, Registry};
use crate::subcluster::SubClusterWrapper;
use crate::{env, names};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use zs_adapters::{CommandRunner, Provider};
use zs_blueprint::{AgentKind, Blueprint, TemplateRef, TemplateStore};
use zs_core::payload::FromData;
use zs_core::{
    AgentErrorPayload, Clock, ClusterId, ClusterState, FailureInfo, IssueInput, IssuePayload,
    LifecycleEvent, LifecyclePayload, Message, MessageDraft, SystemClock, Topic,
    SENDER_ORCHESTRATOR,
};
use zs_isolation::ContainerBackend;
use zs_ledger::{Ledger, MessageBus, Subscription};

/// What boots the cluster: a raw prompt or a fetched issue.
#[derive(Debug, Clone)]
pub enum ClusterInput {
    Prompt(String),
    Issue(IssueInput),
}

impl ClusterInput {
    fn issue(&self) -> IssueInput {
        match self {
            ClusterInput::Prompt(text) => IssueInput::from_prompt(text.clone()),
            ClusterInput::Issue(issue) => issue.clone(),
        }
    }
}

/// Where the agent graph comes from.
#[derive(Debug, Clone)]
pub enum BlueprintSource {
    Inline(Blueprint),
    Template(TemplateRef),
}

/// Which sandbox the cluster runs in.
#[derive(Debug, Clone, Default)]
pub enum IsolationMode {
    #[default]
    None,
    Worktree {
        repo_root: PathBuf,
    },
    Container {
        image: String,
        source: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub input: ClusterInput,
    pub blueprint: BlueprintSource,
    pub isolation: IsolationMode,
    pub cwd: Option<PathBuf>,
    pub auto_pr: bool,
    pub link_issue: bool,
    pub model_override: Option<String>,
    pub issue_provider: Option<String>,
    pub git_platform: Option<String>,
}

impl StartOptions {
    pub fn prompt(text: impl Into<String>, blueprint: BlueprintSource) -> Self {
        Self {
            input: ClusterInput::Prompt(text.into()),
            blueprint,
            isolation: IsolationMode::None,
            cwd: None,
            auto_pr: false,
            link_issue: true,
            model_override: None,
            issue_provider: None,
            git_platform: None,
        }
    }
}

/// Control-loop events. Ledger signal callbacks only enqueue; everything
/// that persists, stops, or mutates topology happens in the control task.
enum Control {
    Terminal { topic: Topic, detail: Option<String> },
    AgentError { agent: String, payload: AgentErrorPayload },
    PersistRegistry,
    ConductorCompleted,
    Operations(Message),
}

/// One live cluster owned by this process.
pub struct ClusterHandle {
    pub id: ClusterId,
    pub ledger: Arc<Ledger<SystemClock>>,
    pub bus: MessageBus<SystemClock>,
    pub blueprint: Arc<Mutex<Blueprint>>,
    pub init: InitBarrier,
    pub(crate) agents: Mutex<Vec<Arc<dyn Agent>>>,
    pub(crate) record: Mutex<ClusterRecord>,
    pub(crate) deps_template: AgentDepsSeed,
    subs: Mutex<Vec<Subscription>>,
    watchdog: watchdog::ConductorWatchdog,
    control_tx: mpsc::UnboundedSender<Control>,
    stopping: AtomicBool,
}

/// The non-generic parts needed to rebuild `AgentDeps` for new agents.
#[derive(Clone)]
pub(crate) struct AgentDepsSeed {
    pub cwd: Option<PathBuf>,
    pub model_override: Option<String>,
    pub container: Option<(Arc<ContainerBackend>, zs_core::ContainerRecord)>,
}

impl ClusterHandle {
    pub fn agent_statuses(&self) -> Vec<zs_core::AgentStatus> {
        self.agents.lock().iter().map(|a| a.status()).collect()
    }

    pub fn record(&self) -> ClusterRecord {
        self.record.lock().clone()
    }
}

pub struct Orchestrator<P: Provider, R: CommandRunner> {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Registry,
    pub(crate) templates: TemplateStore,
    provider: Arc<P>,
    runner: Arc<R>,
    pub(crate) container_backend: Arc<ContainerBackend>,
    clusters: Mutex<HashMap<String, Arc<ClusterHandle>>>,
    weak_self: Weak<Self>,
}

/// Build agent wrappers (plain and sub-cluster) from a blueprint.
pub(crate) fn build_agents<P: Provider, R: CommandRunner, C: Clock>(
    blueprint: &Blueprint,
    deps: &AgentDeps<P, R, C>,
) -> Vec<Arc<dyn Agent>> {
    blueprint
        .agents
        .iter()
        .map(|spec| match spec.kind {
            AgentKind::Agent => {
                AgentWrapper::new(spec.clone(), deps.clone()) as Arc<dyn Agent>
            }
            AgentKind::Subcluster => {
                SubClusterWrapper::new(spec.clone(), deps.clone()) as Arc<dyn Agent>
            }
        })
        .collect()
}

impl<P: Provider, R: CommandRunner> Orchestrator<P, R> {
    pub fn new(config: EngineConfig, provider: Arc<P>, runner: Arc<R>) -> Arc<Self> {
        let registry = Registry::new(&config.state_dir);
        let mut templates = TemplateStore::new();
        templates.load_dir(&config.state_dir.join("templates"));
        Arc::new_cyclic(|weak| Self {
            config,
            registry,
            templates,
            provider,
            runner,
            container_backend: Arc::new(ContainerBackend::new()),
            clusters: Mutex::new(HashMap::new()),
            weak_self: weak.clone(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn me(&self) -> Arc<Self> {
        match self.weak_self.upgrade() {
            Some(me) => me,
            None => unreachable!("orchestrator is only constructed behind an Arc"),
        }
    }

    pub fn handle(&self, id: &ClusterId) -> Option<Arc<ClusterHandle>> {
        self.clusters.lock().get(id.as_str()).cloned()
    }

    fn taken_ids(&self) -> HashSet<String> {
        let mut taken: HashSet<String> =
            self.clusters.lock().keys().cloned().collect();
        if let Ok(map) = self.registry.load() {
            taken.extend(map.keys().cloned());
        }
        if let Ok(entries) = std::fs::read_dir(&self.config.state_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("db") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        taken.insert(stem.to_string());
                    }
                }
            }
        }
        taken
    }

    /// Start a new cluster. Returns once the bootstrap message is in the
    /// ledger and the init barrier has resolved.
    pub async fn start(&self, options: StartOptions) -> Result<ClusterId, OrchestratorError> {
        // A supervisor spawning a child process to run one cluster hands
        // the id down instead of letting us allocate one.
        let id = match env::cluster_id_override() {
            Some(id) => ClusterId::new(id),
            None => names::allocate(&self.taken_ids()),
        };
        let issue = options.input.issue();

        let blueprint = match &options.blueprint {
            BlueprintSource::Inline(blueprint) => blueprint.clone(),
            BlueprintSource::Template(template) => self.templates.resolve(template)?,
        };
        zs_blueprint::validate(&blueprint)?;

        let ledger = Arc::new(Ledger::open(self.config.ledger_path(id.as_str()))?);
        let bus = MessageBus::new(Arc::clone(&ledger), id.clone());

        let mut record =
            ClusterRecord::new(id.clone(), blueprint.clone(), SystemClock.epoch_ms());
        record.auto_pr = options.auto_pr;
        record.link_issue = options.link_issue;
        record.model_override = options.model_override.clone();
        record.issue_provider = options.issue_provider.clone();
        record.git_platform = options.git_platform.clone();

        // Isolation before agents: a failure here is fatal to the start.
        let mut cwd = options.cwd.clone().or_else(env::cwd_override);
        let mut container = None;
        match &options.isolation {
            IsolationMode::None => {}
            IsolationMode::Worktree { repo_root } => {
                let worktree = zs_isolation::create_worktree(&id, repo_root).await?;
                cwd = Some(worktree.path.clone());
                record.worktree = Some(worktree);
            }
            IsolationMode::Container { image, source } => {
                let backend = Arc::clone(&self.container_backend);
                let workspace = backend.prepare_workspace(&id, source).await?;
                let container_record = backend.create_container(&id, image, &workspace).await?;
                zs_isolation::preinstall_dependencies(&backend, &container_record, &workspace)
                    .await?;
                record.isolation = Some(container_record.clone());
                container = Some((backend, container_record));
            }
        }
        self.registry.persist(&record, false)?;

        let shared_blueprint = Arc::new(Mutex::new(blueprint.clone()));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ClusterHandle {
            id: id.clone(),
            ledger,
            bus: bus.clone(),
            blueprint: Arc::clone(&shared_blueprint),
            init: InitBarrier::new(),
            agents: Mutex::new(Vec::new()),
            record: Mutex::new(record),
            deps_template: AgentDepsSeed {
                cwd: cwd.clone(),
                model_override: options.model_override.clone(),
                container: container.clone(),
            },
            subs: Mutex::new(Vec::new()),
            watchdog: watchdog::ConductorWatchdog::default(),
            control_tx,
            stopping: AtomicBool::new(false),
        });
        self.clusters.lock().insert(id.as_str().to_string(), Arc::clone(&handle));

        tokio::spawn(self.me().run_control_loop(Arc::clone(&handle), control_rx));

        // Subscriptions MUST be registered before any agent starts: signals
        // are synchronous and do not replay, so a terminal message from a
        // fast agent published before the orchestrator subscribes would be
        // lost and the cluster would wedge. Never reverse this order.
        self.register_subscriptions(&handle);

        let deps = self.agent_deps(&handle);
        let agents = build_agents(&blueprint, &deps);
        for agent in &agents {
            agent.start().await;
        }
        *handle.agents.lock() = agents;

        // Mark running before the bootstrap goes out: a fast pipeline can
        // reach its terminal message (and the stop path) immediately.
        {
            let mut record = handle.record.lock();
            record.state = ClusterState::Running;
            self.registry.persist(&record, false)?;
        }

        let bootstrap = MessageDraft::new(Topic::ISSUE_OPENED, SENDER_ORCHESTRATOR)
            .text(issue.render())
            .data(
                IssuePayload {
                    issue_number: Some(issue.number),
                    title: Some(issue.title.clone()),
                    url: issue.url.clone(),
                }
                .to_data(),
            );
        bus.publish(bootstrap)?;

        handle.init.resolve();
        tracing::info!(cluster = %id, "cluster started");
        Ok(id)
    }

    pub(crate) fn agent_deps(
        &self,
        handle: &ClusterHandle,
    ) -> AgentDeps<P, R, SystemClock> {
        AgentDeps {
            bus: handle.bus.clone(),
            provider: Arc::clone(&self.provider),
            runner: Arc::clone(&self.runner),
            config: self.config.clone(),
            blueprint: Arc::clone(&handle.blueprint),
            cwd: handle.deps_template.cwd.clone(),
            model_override: handle.deps_template.model_override.clone(),
            container: handle.deps_template.container.clone(),
        }
    }

    fn register_subscriptions(&self, handle: &Arc<ClusterHandle>) {
        let mut subs = handle.subs.lock();
        let scope = handle.id.clone();

        for topic in [Topic::CLUSTER_COMPLETE, Topic::CLUSTER_FAILED] {
            let tx = handle.control_tx.clone();
            let scope = scope.clone();
            subs.push(handle.bus.subscribe_topic(topic, move |msg| {
                if msg.cluster_id != scope {
                    return;
                }
                let _ = tx.send(Control::Terminal {
                    topic: msg.topic.clone(),
                    detail: msg
                        .content
                        .data
                        .as_ref()
                        .and_then(|d| d.get("reason"))
                        .and_then(serde_json::Value::as_str)
                        .map(String::from),
                });
            }));
        }

        {
            let tx = handle.control_tx.clone();
            let scope = scope.clone();
            subs.push(handle.bus.subscribe_topic(Topic::AGENT_ERROR, move |msg| {
                if msg.cluster_id != scope {
                    return;
                }
                if let Some(payload) = AgentErrorPayload::from_message(msg) {
                    let _ = tx.send(Control::AgentError { agent: msg.sender.clone(), payload });
                }
            }));
        }

        {
            let tx = handle.control_tx.clone();
            let scope = scope.clone();
            let blueprint = Arc::clone(&handle.blueprint);
            subs.push(handle.bus.subscribe_topic(Topic::AGENT_LIFECYCLE, move |msg| {
                if msg.cluster_id != scope {
                    return;
                }
                let Some(payload) = LifecyclePayload::from_message(msg) else {
                    return;
                };
                match payload.event {
                    LifecycleEvent::Started
                    | LifecycleEvent::TaskStarted
                    | LifecycleEvent::TaskCompleted
                    | LifecycleEvent::ProcessSpawned
                    | LifecycleEvent::TaskIdAssigned => {
                        let _ = tx.send(Control::PersistRegistry);
                    }
                    _ => {}
                }
                if payload.event == LifecycleEvent::TaskCompleted {
                    let conductor = payload
                        .agent
                        .as_deref()
                        .and_then(|id| blueprint.lock().agent(id).map(|a| a.role.clone()))
                        .map(|role| role == "conductor")
                        .unwrap_or(false);
                    if conductor {
                        let _ = tx.send(Control::ConductorCompleted);
                    }
                }
            }));
        }

        {
            let tx = handle.control_tx.clone();
            let scope = scope.clone();
            subs.push(handle.bus.subscribe_topic(Topic::CLUSTER_OPERATIONS, move |msg| {
                if msg.cluster_id != scope {
                    return;
                }
                let _ = tx.send(Control::Operations(msg.clone()));
            }));
        }
    }

    async fn run_control_loop(
        self: Arc<Self>,
        handle: Arc<ClusterHandle>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
    ) {
        while let Some(event) = control_rx.recv().await {
            match event {
                Control::Terminal { topic, detail } => {
                    tracing::info!(cluster = %handle.id, topic = %topic, "terminal message observed");
                    if topic == Topic::CLUSTER_FAILED {
                        let mut record = handle.record.lock();
                        if record.failure_info.is_none() {
                            record.failure_info = Some(FailureInfo {
                                agent_id: SENDER_ORCHESTRATOR.to_string(),
                                role: None,
                                error: detail.unwrap_or_else(|| "cluster failed".to_string()),
                                task_id: None,
                                iteration: 0,
                                failed_at_ms: SystemClock.epoch_ms(),
                            });
                        }
                    }
                    if let Err(e) = self.stop(&handle.id).await {
                        tracing::error!(cluster = %handle.id, error = %e, "stop after terminal message failed");
                    }
                    break;
                }
                Control::AgentError { agent, payload } => {
                    {
                        let mut record = handle.record.lock();
                        record.failure_info = Some(FailureInfo {
                            agent_id: agent,
                            role: payload.role.clone(),
                            error: payload.error.clone(),
                            task_id: payload.task_id.clone(),
                            iteration: payload.iteration,
                            failed_at_ms: SystemClock.epoch_ms(),
                        });
                        let _ = self.registry.persist(&record, false);
                    }
                    if payload.attempts >= 3 && payload.role.as_deref() == Some("implementation") {
                        tracing::warn!(cluster = %handle.id, "implementation agent exhausted retries; stopping");
                        if let Err(e) = self.stop(&handle.id).await {
                            tracing::error!(cluster = %handle.id, error = %e, "stop after retry exhaustion failed");
                        }
                        break;
                    }
                }
                Control::PersistRegistry => {
                    let record = handle.record.lock().clone();
                    let _ = self.registry.persist(&record, false);
                }
                Control::ConductorCompleted => {
                    handle
                        .watchdog
                        .arm(handle.bus.clone(), self.config.conductor_watchdog);
                }
                Control::Operations(msg) => {
                    handle.watchdog.cancel();
                    self.handle_operations(&handle, &msg).await;
                }
            }
        }
    }

    /// Stop a cluster: bounded barrier wait, agents down, isolation
    /// preserved, record `stopped` with pid cleared.
    pub async fn stop(&self, id: &ClusterId) -> Result<(), OrchestratorError> {
        let Some(handle) = self.handle(id) else {
            return self.stop_foreign(id);
        };
        if handle.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if !handle.init.wait(self.config.stop_barrier_timeout).await {
            tracing::warn!(cluster = %id, "init barrier unresolved at stop; proceeding");
        }

        {
            let mut record = handle.record.lock();
            record.state = ClusterState::Stopping;
            let _ = self.registry.persist(&record, false);
        }

        let agents: Vec<Arc<dyn Agent>> = handle.agents.lock().clone();
        for agent in agents {
            agent.stop().await;
        }
        handle.watchdog.cancel();
        handle.subs.lock().clear();

        if let Some((backend, container)) = &handle.deps_template.container {
            // Workspace (and container) preserved for resume.
            if let Err(e) = backend.stop_container(container).await {
                tracing::warn!(cluster = %id, error = %e, "container stop failed");
            }
        }
        // Worktree-mode checkouts are preserved for resume as well.

        {
            let mut record = handle.record.lock();
            record.state = ClusterState::Stopped;
            record.pid = None;
            self.registry.persist(&record, true)?;
        }
        tracing::info!(cluster = %id, "cluster stopped");
        Ok(())
    }

    /// Stop for a cluster this process does not own: registry-only.
    fn stop_foreign(&self, id: &ClusterId) -> Result<(), OrchestratorError> {
        let map = self.registry.load()?;
        let Some(record) = map.get(id.as_str()) else {
            return Err(OrchestratorError::UnknownCluster(id.clone()));
        };
        let mut record = record.clone();
        record.state = ClusterState::Stopped;
        record.pid = None;
        self.registry.persist(&record, true)?;
        Ok(())
    }

    /// Kill: stop semantics plus removal of container, workspace, and
    /// worktree (branch preserved); ledger closed; registry entry deleted.
    pub async fn kill(&self, id: &ClusterId) -> Result<(), OrchestratorError> {
        let handle = self.handle(id);

        if let Some(handle) = &handle {
            handle.stopping.store(true, Ordering::SeqCst);
            let agents: Vec<Arc<dyn Agent>> = handle.agents.lock().clone();
            for agent in agents {
                agent.stop().await;
            }
            handle.watchdog.cancel();
            handle.subs.lock().clear();
        }

        let record = match &handle {
            Some(handle) => Some(handle.record.lock().clone()),
            None => self.registry.load()?.get(id.as_str()).cloned(),
        };
        let Some(mut record) = record else {
            return Err(OrchestratorError::UnknownCluster(id.clone()));
        };

        if let Some(container) = &record.isolation {
            let backend = Arc::clone(&self.container_backend);
            if let Err(e) = backend.remove_container(id, container, true).await {
                tracing::warn!(cluster = %id, error = %e, "container removal failed during kill");
            }
        }
        if let Some(worktree) = &record.worktree {
            if let Err(e) = zs_isolation::remove_worktree(worktree).await {
                tracing::warn!(cluster = %id, error = %e, "worktree removal failed during kill");
            }
        }

        if let Some(handle) = &handle {
            handle.ledger.close();
        }

        record.state = ClusterState::Killed;
        record.pid = None;
        // Killed records are deleted by persist.
        self.registry.persist(&record, true)?;
        self.clusters.lock().remove(id.as_str());
        tracing::info!(cluster = %id, "cluster killed");
        Ok(())
    }

    /// True when the cluster's ledger file exists but holds no messages:
    /// the cluster never even bootstrapped.
    fn ledger_is_empty(&self, id: &ClusterId) -> bool {
        let path = self.config.ledger_path(id.as_str());
        if !path.exists() {
            return false;
        }
        match Ledger::open(&path) {
            Ok(ledger) => {
                let criteria = zs_ledger::MessageQuery::for_cluster(id.clone());
                matches!(ledger.count(&criteria), Ok(0))
            }
            Err(_) => false,
        }
    }

    /// Observable state for a record: zombie-aware, and `corrupted` when
    /// the ledger holds no messages at all.
    fn observable_state(&self, record: &ClusterRecord) -> ClusterState {
        let state = record.effective_state();
        if state != ClusterState::Zombie && self.ledger_is_empty(&record.id) {
            return ClusterState::Corrupted;
        }
        state
    }

    /// Observable state of one cluster, zombie- and corruption-aware.
    pub fn status(&self, id: &ClusterId) -> Result<ClusterState, OrchestratorError> {
        if let Some(handle) = self.handle(id) {
            let record = handle.record.lock().clone();
            return Ok(self.observable_state(&record));
        }
        let map = self.registry.load()?;
        let Some(record) = map.get(id.as_str()) else {
            return Err(OrchestratorError::UnknownCluster(id.clone()));
        };
        Ok(self.observable_state(record))
    }

    /// Every known cluster with its observable state, corruption included,
    /// so an operator listing surfaces the same states as `status`.
    pub fn list(&self) -> Result<Vec<(ClusterId, ClusterState)>, OrchestratorError> {
        let config = self.config.clone();
        let mut seen: HashMap<String, ClusterState> = HashMap::new();

        let live: Vec<(String, ClusterRecord)> = self
            .clusters
            .lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.record.lock().clone()))
            .collect();
        for (id, record) in live {
            seen.insert(id, self.observable_state(&record));
        }
        let map = self.registry.load_pruned(|id| config.ledger_path(id))?;
        for (id, record) in map {
            seen.entry(id).or_insert_with(|| self.observable_state(&record));
        }

        let mut out: Vec<(ClusterId, ClusterState)> =
            seen.into_iter().map(|(id, state)| (ClusterId::new(id), state)).collect();
        out.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        Ok(out)
    }

    /// Remove isolation artifacts belonging to no registered cluster.
    pub async fn sweep_orphans(&self) -> Result<Vec<PathBuf>, OrchestratorError> {
        let mut known: HashSet<String> = self.registry.load()?.keys().cloned().collect();
        known.extend(self.clusters.lock().keys().cloned());
        Ok(zs_isolation::sweep_orphans(&known).await)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
