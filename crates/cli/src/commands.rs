// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch: thin delegation into the engine.

use crate::output;
use crate::Command;
use anyhow::{bail, Context};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use zs_adapters::{ClaudeProvider, HostRunner};
use zs_blueprint::TemplateRef;
use zs_core::ClusterId;
use zs_engine::{
    BlueprintSource, EngineConfig, IsolationMode, Orchestrator, StartOptions,
};
use zs_ledger::Ledger;

type CliOrchestrator = Orchestrator<ClaudeProvider, HostRunner>;

fn orchestrator() -> Arc<CliOrchestrator> {
    Orchestrator::new(
        EngineConfig::from_env(),
        Arc::new(ClaudeProvider::new()),
        Arc::new(HostRunner),
    )
}

pub async fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run {
            prompt,
            file,
            template,
            params,
            worktree,
            image,
            source,
            model,
            auto_pr,
            no_link_issue,
            detach,
        } => {
            run(
                prompt, file, template, params, worktree, image, source, model, auto_pr,
                no_link_issue, detach,
            )
            .await
        }
        Command::Ls => ls(),
        Command::Status { cluster } => status(&ClusterId::new(cluster)),
        Command::Logs { cluster, follow, tail } => {
            logs(&ClusterId::new(cluster), follow, tail).await
        }
        Command::Stop { cluster } => orchestrator()
            .stop(&ClusterId::new(cluster))
            .await
            .context("stop failed"),
        Command::Kill { cluster } => orchestrator()
            .kill(&ClusterId::new(cluster))
            .await
            .context("kill failed"),
        Command::Resume { cluster } => {
            let orchestrator = orchestrator();
            let id = ClusterId::new(cluster);
            orchestrator.resume(&id).await.context("resume failed")?;
            stream_until_done(&orchestrator, &id).await
        }
        Command::Gc => {
            let removed = orchestrator().sweep_orphans().await?;
            for path in &removed {
                println!("removed {}", path.display());
            }
            println!("{} orphaned dir(s) removed", removed.len());
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    prompt: Option<String>,
    file: Option<PathBuf>,
    template: String,
    params: Vec<(String, String)>,
    worktree: Option<PathBuf>,
    image: Option<String>,
    source: Option<PathBuf>,
    model: Option<String>,
    auto_pr: bool,
    no_link_issue: bool,
    detach: bool,
) -> anyhow::Result<()> {
    let text = match (prompt, file) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        (None, None) => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("cannot read stdin")?;
            buf
        }
    };
    if text.trim().is_empty() {
        bail!("no task given: pass a prompt, --file, or pipe text in");
    }

    let template = if params.is_empty() {
        TemplateRef::Name(template)
    } else {
        TemplateRef::Parameterized {
            base: template,
            params: params.into_iter().collect::<HashMap<_, _>>(),
        }
    };

    let isolation = match (worktree, image) {
        (Some(_), Some(_)) => bail!("--worktree and --image are mutually exclusive"),
        (Some(repo_root), None) => IsolationMode::Worktree { repo_root },
        (None, Some(image)) => IsolationMode::Container {
            image,
            source: match source {
                Some(source) => source,
                None => std::env::current_dir().context("cannot resolve cwd")?,
            },
        },
        (None, None) => IsolationMode::None,
    };

    let mut options = StartOptions::prompt(text, BlueprintSource::Template(template));
    options.isolation = isolation;
    options.model_override = model;
    options.auto_pr = auto_pr;
    options.link_issue = !no_link_issue;

    let orchestrator = orchestrator();
    let id = orchestrator.start(options).await.context("cluster start failed")?;
    println!("{id}");

    if detach {
        return Ok(());
    }
    stream_until_done(&orchestrator, &id).await
}

/// Follow the cluster's log until it reaches a terminal state. Ctrl-C stops
/// the cluster cleanly instead of leaving a zombie behind.
async fn stream_until_done(
    orchestrator: &Arc<CliOrchestrator>,
    id: &ClusterId,
) -> anyhow::Result<()> {
    let Some(handle) = orchestrator.handle(id) else {
        return Ok(());
    };
    let quiet = zs_engine::env::is_daemon();
    let _poll = handle.ledger.poll_for_messages(
        Some(id.clone()),
        move |msg| {
            if !quiet {
                println!("{}", output::format_message(msg));
            }
        },
        Duration::from_millis(250),
        50,
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("stopping {id}…");
                orchestrator.stop(id).await.context("stop on interrupt failed")?;
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_millis(300)) => {
                if handle.record().state.is_terminal() {
                    // Give the poller one last tick to flush the tail.
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    println!("cluster {id} {}", handle.record().state);
                    return Ok(());
                }
            }
        }
    }
}

fn ls() -> anyhow::Result<()> {
    let clusters = orchestrator().list()?;
    if clusters.is_empty() {
        println!("no clusters");
        return Ok(());
    }
    for (id, state) in clusters {
        println!("{:<40} {state}", id.as_str());
    }
    Ok(())
}

fn status(id: &ClusterId) -> anyhow::Result<()> {
    let orchestrator = orchestrator();
    let state = orchestrator.status(id)?;
    println!("cluster: {id}");
    println!("state:   {state}");

    if let Some(handle) = orchestrator.handle(id) {
        for agent in handle.agent_statuses() {
            println!("  agent {:<24} {:<16} iteration {}", agent.id, agent.phase, agent.iteration);
        }
    }

    let ledger = Ledger::open(orchestrator.config().ledger_path(id.as_str()))?;
    let tokens = ledger.tokens_by_role(id)?;
    let mut roles: Vec<&String> = tokens.keys().collect();
    roles.sort();
    for role in roles {
        let usage = &tokens[role];
        println!(
            "  tokens {:<22} in {:>8}  out {:>8}  ${:.4}",
            role, usage.input_tokens, usage.output_tokens, usage.total_cost_usd
        );
    }
    Ok(())
}

async fn logs(id: &ClusterId, follow: bool, tail: usize) -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    let path = config.ledger_path(id.as_str());
    if !path.exists() {
        bail!("no ledger for {id}");
    }
    let ledger = Arc::new(Ledger::open(&path)?);

    if !follow {
        let mut messages = ledger.get_all(id)?;
        let skip = messages.len().saturating_sub(tail);
        for msg in messages.drain(..).skip(skip) {
            println!("{}", output::format_message(&msg));
        }
        return Ok(());
    }

    let _poll = ledger.poll_for_messages(
        Some(id.clone()),
        |msg| println!("{}", output::format_message(msg)),
        Duration::from_millis(250),
        tail,
    );
    tokio::signal::ctrl_c().await.context("signal wait failed")?;
    Ok(())
}
