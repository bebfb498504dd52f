// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-stamping facade over a ledger.
//!
//! Everything in-process publishes through a bus; publishing is exactly an
//! append on the underlying ledger, so in-process subscribers and
//! cross-process pollers observe the same totally ordered log.

use crate::criteria::MessageQuery;
use crate::signals::Subscription;
use crate::store::{Ledger, LedgerError};
use crate::tokens::TokensByRole;
use std::sync::Arc;
use zs_core::{Clock, ClusterId, Message, MessageDraft, SystemClock, Topic};

/// In-process pub/sub handle bound to one cluster.
pub struct MessageBus<C: Clock = SystemClock> {
    ledger: Arc<Ledger<C>>,
    cluster_id: ClusterId,
}

impl<C: Clock> Clone for MessageBus<C> {
    fn clone(&self) -> Self {
        Self { ledger: Arc::clone(&self.ledger), cluster_id: self.cluster_id.clone() }
    }
}

impl<C: Clock> MessageBus<C> {
    pub fn new(ledger: Arc<Ledger<C>>, cluster_id: ClusterId) -> Self {
        Self { ledger, cluster_id }
    }

    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    pub fn ledger(&self) -> &Arc<Ledger<C>> {
        &self.ledger
    }

    /// Publish one message. Returns `None` when the ledger has been closed
    /// (expected during teardown; the loss is accepted).
    pub fn publish(&self, draft: MessageDraft) -> Result<Option<Message>, LedgerError> {
        self.ledger.append(&self.cluster_id, draft)
    }

    /// Publish a set of messages atomically — no other sender's messages
    /// interleave with the batch.
    pub fn publish_batch(
        &self,
        drafts: Vec<MessageDraft>,
    ) -> Result<Option<Vec<Message>>, LedgerError> {
        self.ledger.batch_append(&self.cluster_id, drafts)
    }

    pub fn subscribe(&self, callback: impl Fn(&Message) + Send + Sync + 'static) -> Subscription {
        self.ledger.subscribe(callback)
    }

    pub fn subscribe_topic(
        &self,
        topic: impl Into<Topic>,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.ledger.subscribe_topic(topic, callback)
    }

    /// Query scoped to this bus's cluster.
    pub fn query(&self, criteria: MessageQuery) -> Result<Vec<Message>, LedgerError> {
        let mut criteria = criteria;
        criteria.cluster_id = self.cluster_id.clone();
        self.ledger.query(&criteria)
    }

    pub fn find_last(&self, criteria: MessageQuery) -> Result<Option<Message>, LedgerError> {
        let mut criteria = criteria;
        criteria.cluster_id = self.cluster_id.clone();
        self.ledger.find_last(&criteria)
    }

    pub fn get_all(&self) -> Result<Vec<Message>, LedgerError> {
        self.ledger.get_all(&self.cluster_id)
    }

    pub fn tokens_by_role(&self) -> Result<TokensByRole, LedgerError> {
        self.ledger.tokens_by_role(&self.cluster_id)
    }

    /// Criteria builder pre-scoped to this bus's cluster.
    pub fn criteria(&self) -> MessageQuery {
        MessageQuery::for_cluster(self.cluster_id.clone())
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
