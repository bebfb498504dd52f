// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency preinstall for isolated workspaces.
//!
//! Runs once after the workspace copy so the first agent does not pay the
//! install cost inside its own timeout. Retries with exponential backoff;
//! a present prebake (already-installed dependency dir) downgrades the
//! install to an offline/no-op path where the package manager supports it.

use crate::container::ContainerBackend;
use crate::error::IsolationError;
use crate::subprocess::{brief_output, INSTALL_TIMEOUT};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use zs_core::ContainerRecord;

const INSTALL_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// A recognized dependency manifest and the command that installs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub manifest: &'static str,
    pub argv: Vec<String>,
}

/// Inspect a workspace for a known manifest. The first match wins, ordered
/// by how likely the ecosystem is to need a preinstall at all.
pub fn detect_install(workspace: &Path) -> Option<InstallPlan> {
    if workspace.join("package.json").exists() {
        let prebaked = workspace.join("node_modules").exists();
        let argv = if workspace.join("package-lock.json").exists() {
            if prebaked {
                vec!["npm".into(), "ci".into(), "--prefer-offline".into()]
            } else {
                vec!["npm".into(), "ci".into()]
            }
        } else {
            vec!["npm".into(), "install".into()]
        };
        return Some(InstallPlan { manifest: "package.json", argv });
    }
    if workspace.join("Cargo.toml").exists() {
        return Some(InstallPlan {
            manifest: "Cargo.toml",
            argv: vec!["cargo".into(), "fetch".into()],
        });
    }
    if workspace.join("requirements.txt").exists() {
        return Some(InstallPlan {
            manifest: "requirements.txt",
            argv: vec!["pip".into(), "install".into(), "-r".into(), "requirements.txt".into()],
        });
    }
    None
}

/// Preinstall dependencies inside the cluster's container. No recognized
/// manifest is a clean no-op.
pub async fn preinstall_dependencies(
    backend: &ContainerBackend,
    record: &ContainerRecord,
    workspace: &Path,
) -> Result<(), IsolationError> {
    let Some(plan) = detect_install(workspace) else {
        return Ok(());
    };
    tracing::info!(manifest = plan.manifest, "preinstalling dependencies");

    let mut detail = String::new();
    for attempt in 1..=INSTALL_ATTEMPTS {
        let result = backend
            .exec_in_container(record, &plan.argv, &HashMap::new(), Some(INSTALL_TIMEOUT))
            .await;
        match result {
            Ok(output) if output.status.success() => return Ok(()),
            Ok(output) => detail = brief_output(&output),
            Err(e) => detail = e.to_string(),
        }
        if attempt < INSTALL_ATTEMPTS {
            let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
            tracing::warn!(attempt, error = %detail, "dependency install failed; backing off");
            tokio::time::sleep(backoff).await;
        }
    }
    Err(IsolationError::InstallFailed { attempts: INSTALL_ATTEMPTS, detail })
}

#[cfg(test)]
#[path = "preinstall_tests.rs"]
mod tests;
