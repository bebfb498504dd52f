// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zs-isolation: Per-cluster filesystem and runtime sandboxes.
//!
//! Two backends, one active per cluster: lightweight git worktrees sharing
//! the host toolchain, and heavyweight docker containers running against an
//! isolated copy of the working tree. Both are driven through subprocess
//! helpers that enforce a wall-clock timeout on every external command.

pub mod container;
pub mod copytree;
pub mod credential;
pub mod error;
pub mod paths;
pub mod preinstall;
pub mod subprocess;
pub mod sweep;
pub mod worktree;

pub use container::ContainerBackend;
pub use copytree::{copy_tree, CopyStats};
pub use credential::{prepare_config_dir, resolve_credential, Credential};
pub use error::IsolationError;
pub use preinstall::preinstall_dependencies;
pub use subprocess::{run_with_timeout, SubprocessError};
pub use sweep::sweep_orphans;
pub use worktree::{create_worktree, remove_worktree};
