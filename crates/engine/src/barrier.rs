// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-use cluster initialization barrier.
//!
//! Carried on the cluster handle; `stop` awaits it (bounded) so a stop
//! racing a start never tears down a half-wired cluster.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct InitBarrier {
    tx: watch::Sender<bool>,
}

impl Default for InitBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl InitBarrier {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Mark initialization complete. Idempotent.
    pub fn resolve(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_resolved(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for resolution, giving up after `timeout`. Returns whether the
    /// barrier resolved in time.
    pub async fn wait(&self, timeout: Duration) -> bool {
        if self.is_resolved() {
            return true;
        }
        let mut rx = self.tx.subscribe();
        tokio::time::timeout(timeout, async {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .is_ok()
            && self.is_resolved()
    }
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
