// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential resolution and the per-cluster private config mount.
//!
//! Containerized agents cannot reach the host keychain or config files, so
//! credentials are resolved on the host at cluster start and placed in a
//! private per-cluster directory that is bind-mounted read-only. The
//! directory also carries a hook that blocks interactive permission
//! prompts, which would otherwise hang a headless agent forever.
//!
//! Resolution order:
//!
//! ```text
//! 1. CLAUDE_CODE_OAUTH_TOKEN env var
//! 2. ~/.claude/.credentials.json → claudeAiOauth.accessToken
//! 3. ANTHROPIC_API_KEY env var
//! ```

use crate::error::IsolationError;
use crate::paths;
use std::path::PathBuf;
use zs_core::ClusterId;

/// A resolved credential for injecting into a container.
#[derive(Debug, Clone)]
pub enum Credential {
    /// OAuth token — injected as `CLAUDE_CODE_OAUTH_TOKEN`.
    OAuthToken(String),
    /// API key — injected as `ANTHROPIC_API_KEY`.
    ApiKey(String),
}

impl Credential {
    /// Returns the environment variable name and value for this credential.
    pub fn to_env_pair(&self) -> (&'static str, &str) {
        match self {
            Credential::OAuthToken(token) => ("CLAUDE_CODE_OAUTH_TOKEN", token),
            Credential::ApiKey(key) => ("ANTHROPIC_API_KEY", key),
        }
    }
}

/// Walk the fallback chain; `None` means the agent will likely fail auth.
pub fn resolve_credential() -> Option<Credential> {
    if let Ok(token) = std::env::var("CLAUDE_CODE_OAUTH_TOKEN") {
        if !token.is_empty() {
            return Some(Credential::OAuthToken(token));
        }
    }
    if let Some(token) = read_credentials_file() {
        return Some(Credential::OAuthToken(token));
    }
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.is_empty() {
            return Some(Credential::ApiKey(key));
        }
    }
    None
}

fn read_credentials_file() -> Option<String> {
    let path = home_dir()?.join(".claude/.credentials.json");
    let body = std::fs::read_to_string(path).ok()?;
    let doc: serde_json::Value = serde_json::from_str(&body).ok()?;
    let token = doc.get("claudeAiOauth")?.get("accessToken")?.as_str()?;
    (!token.is_empty()).then(|| token.to_string())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// Hook script placed in the config mount. Answers any interactive
/// permission prompt with denial instead of hanging the stream.
const BLOCK_PROMPTS_HOOK: &str = "#!/bin/sh\n# Headless agents must never wait on a human.\necho '{\"decision\": \"block\", \"reason\": \"interactive prompts are disabled in cluster isolation\"}'\n";

/// Create `<tmp>/zeroshot-cluster-configs/<cluster>/` holding only the
/// essential credential material plus the prompt-blocking hook. Returns the
/// directory path for bind-mounting.
pub async fn prepare_config_dir(
    cluster_id: &ClusterId,
    credential: Option<Credential>,
) -> Result<PathBuf, IsolationError> {
    let dir = paths::config_dir(cluster_id);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| IsolationError::io(dir.clone(), e))?;

    if let Some(credential) = credential {
        let (key, value) = credential.to_env_pair();
        let body = format!("{key}={value}\n");
        let path = dir.join("credentials.env");
        tokio::fs::write(&path, body).await.map_err(|e| IsolationError::io(path, e))?;
    }

    let hook_path = dir.join("block-prompts.sh");
    tokio::fs::write(&hook_path, BLOCK_PROMPTS_HOOK)
        .await
        .map_err(|e| IsolationError::io(hook_path.clone(), e))?;
    make_executable(&hook_path).await?;

    Ok(dir)
}

async fn make_executable(path: &std::path::Path) -> Result<(), IsolationError> {
    use std::os::unix::fs::PermissionsExt;
    let metadata =
        tokio::fs::metadata(path).await.map_err(|e| IsolationError::io(path.to_path_buf(), e))?;
    let mut perms = metadata.permissions();
    perms.set_mode(perms.mode() | 0o755);
    tokio::fs::set_permissions(path, perms)
        .await
        .map_err(|e| IsolationError::io(path.to_path_buf(), e))
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
