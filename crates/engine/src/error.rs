// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.

use thiserror::Error;
use zs_core::ClusterId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry lock at {path} is busy after {attempts} attempts")]
    LockContention { path: String, attempts: u32 },

    #[error("registry io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("registry file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown cluster {0}")]
    UnknownCluster(ClusterId),

    #[error("cluster {id} is {state}, expected {expected}")]
    WrongState { id: ClusterId, state: String, expected: &'static str },

    #[error("cluster {id} cannot be resumed: {reason}")]
    NotResumable { id: ClusterId, reason: String },

    #[error(transparent)]
    Blueprint(#[from] zs_blueprint::BlueprintError),

    #[error(transparent)]
    Ledger(#[from] zs_ledger::LedgerError),

    #[error(transparent)]
    Isolation(#[from] zs_isolation::IsolationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
