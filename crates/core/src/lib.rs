// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zs-core: Data model shared by the zeroshot cluster runtime

pub mod agent;
pub mod clock;
pub mod cluster;
pub mod id;
pub mod message;
pub mod payload;
pub mod topic;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{AgentPhase, AgentStatus};
pub use clock::{Clock, FakeClock, SystemClock};
pub use cluster::{
    ClusterId, ClusterState, ContainerRecord, FailureInfo, WorktreeRecord, SENDER_ORCHESTRATOR,
    SENDER_SYSTEM,
};
pub use id::{short, MessageId, TaskId};
pub use message::{Message, MessageContent, MessageDraft, RECEIVER_BROADCAST};
pub use payload::{
    AgentErrorPayload, CriterionResult, FailurePayload, IssueInput, IssuePayload,
    LifecycleEvent, LifecyclePayload, OutputPayload, TokenUsagePayload, ValidationResultPayload,
};
pub use topic::Topic;
