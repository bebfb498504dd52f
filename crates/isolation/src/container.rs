// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container-mode isolation over the docker CLI.
//!
//! The cluster's working tree is copied (minus artifacts) into an isolated
//! workspace, re-initialized as a fresh repository, and mounted into a
//! long-lived container holding a `sleep infinity` process. Agent commands
//! are routed through `docker exec`; the docker socket is mounted so agents
//! can use containers themselves.

use crate::copytree::copy_tree;
use crate::credential::{self, Credential};
use crate::error::IsolationError;
use crate::paths;
use crate::subprocess::{
    brief_output, run_with_timeout, DOCKER_TIMEOUT, EXEC_DEFAULT_TIMEOUT, GIT_TIMEOUT,
};
use crate::worktree::is_git_repo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zs_adapters::{CommandRunner, HostRunner, RunningChild, SpawnSpec};
use zs_core::{ClusterId, ContainerRecord};

/// Mount point of the workspace inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";
/// Mount point of the per-cluster private config dir.
pub const CONTAINER_CONFIG_DIR: &str = "/zeroshot/config";

/// Host env vars forwarded into containers when present.
const FORWARDED_ENV: [&str; 4] =
    ["ANTHROPIC_API_KEY", "CLAUDE_CODE_OAUTH_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Docker CLI lifecycle for container-mode clusters.
#[derive(Debug, Clone)]
pub struct ContainerBackend {
    docker: String,
}

impl Default for ContainerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBackend {
    pub fn new() -> Self {
        let docker =
            std::env::var("ZEROSHOT_DOCKER_BIN").unwrap_or_else(|_| "docker".to_string());
        Self { docker }
    }

    fn docker_cmd(&self, args: &[String]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.docker);
        cmd.args(args);
        cmd
    }

    /// Verify the container runtime responds at all.
    pub async fn available(&self) -> Result<(), IsolationError> {
        let output = run_with_timeout(
            self.docker_cmd(&["version".to_string(), "--format".to_string(), "{{.Server.Version}}".to_string()]),
            DOCKER_TIMEOUT,
            "docker version",
        )
        .await
        .map_err(|e| IsolationError::RuntimeUnavailable { detail: e.to_string() })?;
        if !output.status.success() {
            return Err(IsolationError::RuntimeUnavailable { detail: brief_output(&output) });
        }
        Ok(())
    }

    pub async fn image_exists(&self, image: &str) -> bool {
        matches!(
            run_with_timeout(
                self.docker_cmd(&["image".to_string(), "inspect".to_string(), image.to_string()]),
                DOCKER_TIMEOUT,
                "docker image inspect",
            )
            .await,
            Ok(output) if output.status.success()
        )
    }

    /// Build the isolated workspace copy for a cluster. When the source is a
    /// git repository the copy is re-initialized as a fresh repo in one
    /// batched git sequence, with an authenticated origin injected when
    /// credentials are discoverable.
    pub async fn prepare_workspace(
        &self,
        cluster_id: &ClusterId,
        source: &Path,
    ) -> Result<PathBuf, IsolationError> {
        let workspace = paths::isolated_dir(cluster_id);
        copy_tree(source, &workspace).await?;

        if is_git_repo(source).await {
            let origin = discover_origin(source).await;
            let remote_step = match origin.as_deref().map(authenticated_origin) {
                Some(Some(url)) => format!("git remote add origin {} && ", shell_quote(&url)),
                Some(None) => String::new(),
                None => String::new(),
            };
            let script = format!(
                "cd {ws} && git init --quiet && {remote}git add -A && \
                 git -c user.email=cluster@zeroshot -c user.name=zeroshot \
                 commit --allow-empty --quiet -m 'isolated workspace' && \
                 git checkout --quiet -b {branch}",
                ws = shell_quote(&workspace.display().to_string()),
                remote = remote_step,
                branch = shell_quote(&format!("zeroshot/{}", cluster_id.suffix())),
            );
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(script);
            let output = run_with_timeout(cmd, GIT_TIMEOUT, "workspace git init").await?;
            if !output.status.success() {
                return Err(IsolationError::Git {
                    context: "workspace init",
                    detail: brief_output(&output),
                });
            }
        }
        Ok(workspace)
    }

    /// Start the cluster's container against a prepared workspace.
    pub async fn create_container(
        &self,
        cluster_id: &ClusterId,
        image: &str,
        workspace: &Path,
    ) -> Result<ContainerRecord, IsolationError> {
        self.available().await?;
        if !self.image_exists(image).await {
            return Err(IsolationError::ImageMissing { image: image.to_string() });
        }

        let config_dir = credential::prepare_config_dir(cluster_id, credential::resolve_credential())
            .await?;

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container_name(cluster_id),
            "--label".to_string(),
            format!("zeroshot.cluster={cluster_id}"),
            "-v".to_string(),
            format!("{}:{CONTAINER_WORKDIR}", workspace.display()),
            "-v".to_string(),
            "/var/run/docker.sock:/var/run/docker.sock".to_string(),
            "-v".to_string(),
            format!("{}:{CONTAINER_CONFIG_DIR}:ro", config_dir.display()),
            "-w".to_string(),
            CONTAINER_WORKDIR.to_string(),
        ];
        if let Some(gid) = docker_socket_gid() {
            args.push("--group-add".to_string());
            args.push(gid.to_string());
        }
        for key in FORWARDED_ENV {
            if std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false) {
                args.push("-e".to_string());
                args.push(key.to_string());
            }
        }
        args.push(image.to_string());
        // Hold-open command: the container lives until stop/kill.
        args.push("sleep".to_string());
        args.push("infinity".to_string());

        let output =
            run_with_timeout(self.docker_cmd(&args), DOCKER_TIMEOUT, "docker run").await?;
        if !output.status.success() {
            return Err(IsolationError::Container {
                context: "run",
                detail: brief_output(&output),
            });
        }
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(ContainerRecord {
            container_id,
            image: image.to_string(),
            work_dir: PathBuf::from(CONTAINER_WORKDIR),
            config_dir,
        })
    }

    pub async fn container_exists(&self, record: &ContainerRecord) -> bool {
        matches!(
            run_with_timeout(
                self.docker_cmd(&[
                    "inspect".to_string(),
                    "--format".to_string(),
                    "{{.State.Running}}".to_string(),
                    record.container_id.clone(),
                ]),
                DOCKER_TIMEOUT,
                "docker inspect",
            )
            .await,
            Ok(output) if output.status.success()
        )
    }

    /// One-shot command inside the container. The timeout is mandatory:
    /// `None` uses the 30 s default and zero is rejected.
    pub async fn exec_in_container(
        &self,
        record: &ContainerRecord,
        argv: &[String],
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<std::process::Output, IsolationError> {
        let timeout = match timeout {
            None => EXEC_DEFAULT_TIMEOUT,
            Some(t) if t.is_zero() => return Err(IsolationError::ZeroTimeout),
            Some(t) => t,
        };
        let args = exec_argv(record, argv, env);
        Ok(run_with_timeout(self.docker_cmd(&args), timeout, "docker exec").await?)
    }

    /// Streaming command inside the container, suitable for the agent
    /// output pipeline. `timeout: None` is infinite and reserved for
    /// `stop_cluster` watcher agents, exactly like host spawns.
    pub async fn spawn_in_container(
        &self,
        record: &ContainerRecord,
        argv: &[String],
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<RunningChild, IsolationError> {
        let spec = SpawnSpec {
            binary: self.docker.clone(),
            args: exec_argv(record, argv, env),
            env: HashMap::new(),
            cwd: None,
            timeout,
        };
        HostRunner
            .spawn(spec)
            .await
            .map_err(|e| IsolationError::Container { context: "exec spawn", detail: e.to_string() })
    }

    pub async fn stop_container(&self, record: &ContainerRecord) -> Result<(), IsolationError> {
        let output = run_with_timeout(
            self.docker_cmd(&["stop".to_string(), record.container_id.clone()]),
            DOCKER_TIMEOUT,
            "docker stop",
        )
        .await?;
        if !output.status.success() {
            tracing::warn!(
                container = %record.container_id,
                "docker stop failed: {}",
                brief_output(&output)
            );
        }
        Ok(())
    }

    /// Force-remove the container; optionally delete the workspace and the
    /// private config dir with it. Terraform state found in the workspace is
    /// copied aside first.
    pub async fn remove_container(
        &self,
        cluster_id: &ClusterId,
        record: &ContainerRecord,
        remove_workspace: bool,
    ) -> Result<(), IsolationError> {
        let _ = run_with_timeout(
            self.docker_cmd(&["rm".to_string(), "-f".to_string(), record.container_id.clone()]),
            DOCKER_TIMEOUT,
            "docker rm",
        )
        .await;

        if remove_workspace {
            let workspace = paths::isolated_dir(cluster_id);
            if workspace.exists() {
                rescue_terraform_state(cluster_id, &workspace).await;
                tokio::fs::remove_dir_all(&workspace)
                    .await
                    .map_err(|e| IsolationError::io(workspace.clone(), e))?;
            }
            if record.config_dir.exists() {
                tokio::fs::remove_dir_all(&record.config_dir)
                    .await
                    .map_err(|e| IsolationError::io(record.config_dir.clone(), e))?;
            }
        }
        Ok(())
    }
}

/// `docker exec` argv for a command in the cluster's container.
pub fn exec_argv(
    record: &ContainerRecord,
    argv: &[String],
    env: &HashMap<String, String>,
) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "-w".to_string(),
        record.work_dir.display().to_string(),
    ];
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort_unstable();
    for key in keys {
        args.push("-e".to_string());
        args.push(format!("{key}={}", env[key]));
    }
    args.push(record.container_id.clone());
    args.extend(argv.iter().cloned());
    args
}

pub fn container_name(cluster_id: &ClusterId) -> String {
    format!("zeroshot-{cluster_id}")
}

/// Group id owning the docker socket, for `--group-add`.
fn docker_socket_gid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/var/run/docker.sock").ok().map(|m| m.gid())
}

async fn discover_origin(repo: &Path) -> Option<String> {
    let mut cmd = tokio::process::Command::new("git");
    cmd.arg("-C").arg(repo).args(["remote", "get-url", "origin"]);
    let output = run_with_timeout(cmd, GIT_TIMEOUT, "git remote get-url").await.ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!url.is_empty()).then_some(url)
}

/// Inject a discovered token into an https origin so pushes from inside the
/// container authenticate. Non-https origins pass through unchanged.
pub fn authenticated_origin(url: &str) -> Option<String> {
    let token = std::env::var("GITHUB_TOKEN")
        .or_else(|_| std::env::var("GH_TOKEN"))
        .ok()
        .filter(|t| !t.is_empty())?;
    let rest = url.strip_prefix("https://")?;
    // Already credentialed URLs stay as-is.
    if rest.contains('@') {
        return Some(url.to_string());
    }
    Some(format!("https://x-access-token:{token}@{rest}"))
}

/// Copy `*.tfstate` files out of a workspace before it is deleted.
async fn rescue_terraform_state(cluster_id: &ClusterId, workspace: &Path) {
    let mut found = Vec::new();
    let mut dirs = vec![workspace.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => dirs.push(path),
                Ok(kind) if kind.is_file() => {
                    if path.extension().and_then(|e| e.to_str()) == Some("tfstate") {
                        found.push(path);
                    }
                }
                _ => {}
            }
        }
    }
    if found.is_empty() {
        return;
    }
    let rescue = paths::state_rescue_root().join(cluster_id.as_str());
    if tokio::fs::create_dir_all(&rescue).await.is_err() {
        return;
    }
    for path in found {
        if let Some(name) = path.file_name() {
            let _ = tokio::fs::copy(&path, rescue.join(name)).await;
        }
    }
    tracing::info!(cluster = %cluster_id, dir = %rescue.display(), "terraform state preserved");
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
