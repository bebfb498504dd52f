// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-wire message entity.
//!
//! Messages are immutable once appended to a ledger. The ledger allocates
//! ids and timestamps; callers hand it a [`MessageDraft`].

use crate::cluster::ClusterId;
use crate::id::MessageId;
use crate::topic::Topic;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Receiver name addressing every subscriber in the cluster.
pub const RECEIVER_BROADCAST: &str = "broadcast";

/// Free text and/or structured data carried by a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), data: None }
    }

    pub fn data(data: Value) -> Self {
        Self { text: None, data: Some(data) }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.data.is_none()
    }
}

/// A fully materialized, appended message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Epoch milliseconds, strictly increasing within one ledger's appends.
    pub timestamp: u64,
    pub cluster_id: ClusterId,
    pub topic: Topic,
    pub sender: String,
    pub receiver: String,
    #[serde(default, skip_serializing_if = "MessageContent::is_empty")]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.receiver == RECEIVER_BROADCAST
    }

    /// True when `agent_id` should observe this message: broadcast or
    /// addressed directly.
    pub fn addressed_to(&self, agent_id: &str) -> bool {
        self.is_broadcast() || self.receiver == agent_id
    }
}

/// What a publisher hands the ledger. Id and timestamp are allocated at
/// append time; a caller-supplied timestamp is honored only if it is
/// strictly greater than the ledger's last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub topic: Topic,
    pub sender: String,
    #[serde(default = "default_receiver")]
    pub receiver: String,
    #[serde(default, skip_serializing_if = "MessageContent::is_empty")]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_receiver() -> String {
    RECEIVER_BROADCAST.to_string()
}

impl MessageDraft {
    pub fn new(topic: impl Into<Topic>, sender: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: None,
            topic: topic.into(),
            sender: sender.into(),
            receiver: default_receiver(),
            content: MessageContent::default(),
            metadata: None,
        }
    }

    pub fn to(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = receiver.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.text = Some(text.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.content.data = Some(data);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Materialize with ledger-allocated identity. Used by the ledger only.
    pub fn materialize(self, cluster_id: ClusterId, timestamp: u64) -> Message {
        Message {
            id: self.id.unwrap_or_default(),
            timestamp,
            cluster_id,
            topic: self.topic,
            sender: self.sender,
            receiver: self.receiver,
            content: self.content,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
