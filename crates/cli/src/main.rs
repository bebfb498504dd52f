// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `zs` — the zeroshot cluster CLI.
//!
//! Thin shell over the engine: start clusters, observe them, stop/kill/
//! resume them, follow their logs, and sweep orphaned isolation dirs.
//! Exits 0 on success, 1 on any failure.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "zs", about = "Coordinate fleets of LLM agent clusters", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a cluster for a prompt, a file, or piped input
    Run {
        /// Task text; reads the --file option or stdin when omitted
        prompt: Option<String>,
        /// Read the task from a file instead
        #[arg(long)]
        file: Option<PathBuf>,
        /// Named blueprint template
        #[arg(long, default_value = "standard")]
        template: String,
        /// template parameters as key=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Run inside a git worktree of this repository
        #[arg(long)]
        worktree: Option<PathBuf>,
        /// Run inside a container of this image against an isolated copy
        #[arg(long)]
        image: Option<String>,
        /// Source tree for container isolation (defaults to the cwd)
        #[arg(long, requires = "image")]
        source: Option<PathBuf>,
        /// Model override for every agent
        #[arg(long)]
        model: Option<String>,
        /// Open a PR when the cluster ships
        #[arg(long)]
        auto_pr: bool,
        /// Omit issue references in commits/PRs (cross-host trackers)
        #[arg(long)]
        no_link_issue: bool,
        /// Detach instead of streaming until the cluster finishes
        #[arg(long)]
        detach: bool,
    },
    /// List known clusters and their states
    Ls,
    /// Show one cluster's state, agents, and token usage
    Status { cluster: String },
    /// Print (or follow) a cluster's message log
    Logs {
        cluster: String,
        /// Keep following new messages
        #[arg(short, long)]
        follow: bool,
        /// How many trailing messages to print first
        #[arg(short = 'n', long, default_value_t = 50)]
        tail: usize,
    },
    /// Stop a running cluster, preserving its isolation for resume
    Stop { cluster: String },
    /// Kill a cluster and remove its isolation and registry entry
    Kill { cluster: String },
    /// Resume a stopped or zombie cluster
    Resume { cluster: String },
    /// Remove isolation artifacts belonging to no registered cluster
    Gc,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if zs_engine::env::is_daemon() {
        let dir = zs_engine::env::state_dir().join("logs");
        let _ = std::fs::create_dir_all(&dir);
        let appender = tracing_appender::rolling::daily(dir, "zs.log");
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(appender).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = commands::dispatch(cli.command).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
