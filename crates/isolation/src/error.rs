// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Isolation error taxonomy. Fatal to the cluster at start; on resume,
//! surfaced with enough detail to act on.

use crate::subprocess::SubprocessError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("{path} is not a git repository")]
    NotAGitRepo { path: PathBuf },

    #[error("git {context} failed: {detail}")]
    Git { context: &'static str, detail: String },

    #[error("container runtime unavailable: {detail}")]
    RuntimeUnavailable { detail: String },

    #[error("image {image:?} does not exist and auto-build is disabled")]
    ImageMissing { image: String },

    #[error("no container recorded for cluster {cluster_id}")]
    ContainerMissing { cluster_id: String },

    #[error("container command {context} failed: {detail}")]
    Container { context: &'static str, detail: String },

    #[error("a zero timeout is not allowed for container exec")]
    ZeroTimeout,

    #[error("dependency install failed after {attempts} attempts: {detail}")]
    InstallFailed { attempts: u32, detail: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
}

impl IsolationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
