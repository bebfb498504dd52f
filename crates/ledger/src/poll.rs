// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process polling observer.
//!
//! In-process subscribers get synchronous signals; a second process watching
//! the same ledger file polls instead. Each tick reads from slightly before
//! the newest timestamp seen (to tolerate writer/reader clock skew) and
//! deduplicates by message id, so a callback sees every message exactly once.

use crate::store::Ledger;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zs_core::{Clock, ClusterId, Message};

/// Slack subtracted from the newest seen timestamp on each poll, covering
/// clock skew between the writing and reading process.
const POLL_SLACK_MS: u64 = 1_000;

/// Dedup set bound; pruned down to half when exceeded.
const DEDUP_MAX: usize = 4_096;

/// Handle for a running poller. Dropping it (or calling `stop`) ends the
/// poll loop.
#[derive(Debug)]
pub struct PollHandle {
    cancel: CancellationToken,
}

impl PollHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct DedupWindow {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupWindow {
    fn new() -> Self {
        Self { seen: HashSet::new(), order: VecDeque::new() }
    }

    /// Returns true when the id is new.
    fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > DEDUP_MAX {
            while self.order.len() > DEDUP_MAX / 2 {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }
}

impl<C: Clock> Ledger<C> {
    /// Watch the store for new messages from another process.
    ///
    /// The first tick delivers the last `initial_count` messages for the
    /// cluster (or across all clusters when `cluster_id` is `None`); later
    /// ticks deliver everything since the newest seen timestamp minus a
    /// small slack, deduplicated by id. Transient store errors are logged
    /// and the loop keeps polling.
    pub fn poll_for_messages(
        self: &Arc<Self>,
        cluster_id: Option<ClusterId>,
        callback: impl Fn(&Message) + Send + Sync + 'static,
        interval: Duration,
        initial_count: usize,
    ) -> PollHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let ledger = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut window = DedupWindow::new();
            let mut last_seen: Option<u64> = None;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let read = match last_seen {
                    None => match &cluster_id {
                        Some(id) => ledger
                            .query(
                                &crate::MessageQuery::for_cluster(id.clone())
                                    .order(crate::SortOrder::Desc)
                                    .limit(initial_count as u64),
                            )
                            .map(|mut msgs| {
                                msgs.reverse();
                                msgs
                            }),
                        None => ledger.tail_all_clusters(initial_count),
                    },
                    Some(newest) => {
                        let since = newest.saturating_sub(POLL_SLACK_MS);
                        match &cluster_id {
                            Some(id) => ledger.since(id, since),
                            None => ledger.since_all_clusters(since),
                        }
                    }
                };

                let messages = match read {
                    Ok(messages) => messages,
                    Err(e) => {
                        tracing::warn!(error = %e, "ledger poll tick failed; will retry");
                        continue;
                    }
                };

                // An empty store leaves `last_seen` unset, so the next tick
                // is still a "first" tick.
                for msg in &messages {
                    last_seen = Some(last_seen.unwrap_or(0).max(msg.timestamp));
                    if window.insert(msg.id.as_str()) {
                        callback(msg);
                    }
                }
            }
        });

        PollHandle { cancel }
    }
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
