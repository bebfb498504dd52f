// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous subscription signals.
//!
//! Two registries per ledger: one "all messages" fan-out and one map of
//! topic listeners. The registry mutex is held only to snapshot the
//! callback list; callbacks run outside it, in subscription order, on the
//! appending thread. Observers that need to do real work buffer into their
//! own channels.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use zs_core::{Message, Topic};

type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    all: Vec<(u64, Callback)>,
    by_topic: HashMap<String, Vec<(u64, Callback)>>,
}

impl Registry {
    fn remove(&mut self, id: u64, topic: Option<&str>) {
        match topic {
            None => self.all.retain(|(sid, _)| *sid != id),
            Some(topic) => {
                if let Some(listeners) = self.by_topic.get_mut(topic) {
                    listeners.retain(|(sid, _)| *sid != id);
                    if listeners.is_empty() {
                        self.by_topic.remove(topic);
                    }
                }
            }
        }
    }
}

/// Signal hub owned by a ledger.
pub(crate) struct Signals {
    registry: Arc<Mutex<Registry>>,
}

impl Signals {
    pub(crate) fn new() -> Self {
        Self { registry: Arc::new(Mutex::new(Registry::default())) }
    }

    pub(crate) fn subscribe(&self, callback: impl Fn(&Message) + Send + Sync + 'static) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.all.push((id, Arc::new(callback)));
        Subscription { id, topic: None, registry: Arc::downgrade(&self.registry) }
    }

    pub(crate) fn subscribe_topic(
        &self,
        topic: Topic,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .by_topic
            .entry(topic.as_str().to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            topic: Some(topic.as_str().to_string()),
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Fan out one committed message: all-subscribers first, then the
    /// topic's listeners, each in subscription order.
    pub(crate) fn emit(&self, msg: &Message) {
        let callbacks: Vec<Callback> = {
            let registry = self.registry.lock();
            let mut snapshot: Vec<Callback> =
                registry.all.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            if let Some(listeners) = registry.by_topic.get(msg.topic.as_str()) {
                snapshot.extend(listeners.iter().map(|(_, cb)| Arc::clone(cb)));
            }
            snapshot
        };
        for callback in callbacks {
            callback(msg);
        }
    }
}

/// Unsubscribe capability returned by `subscribe`/`subscribe_topic`.
/// Dropping it detaches the callback.
pub struct Subscription {
    id: u64,
    topic: Option<String>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Detach explicitly. Equivalent to dropping.
    pub fn cancel(self) {}

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.id, self.topic.as_deref());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
