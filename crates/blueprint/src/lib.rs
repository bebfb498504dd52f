// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zs-blueprint: Cluster blueprints — the agent graph a cluster runs.
//!
//! A blueprint is a list of agent specs: id, role, triggers, hooks, and for
//! sub-cluster agents an embedded child blueprint. Blueprints arrive from
//! user JSON, from named templates with `{{param}}` substitution, or from
//! runtime operation chains; every path runs the validator before the graph
//! touches a live cluster.

pub mod operations;
pub mod spec;
pub mod template;
pub mod validate;

pub use operations::{Operation, OperationChain};
pub use spec::{
    AgentKind, AgentSpec, Blueprint, CompletionHook, Hooks, TriggerAction, TriggerLogic,
    TriggerSpec,
};
pub use template::{TemplateRef, TemplateStore};
pub use validate::{validate, BlueprintError, MAX_NESTING_DEPTH};
