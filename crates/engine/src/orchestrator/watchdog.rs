// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conductor watchdog.
//!
//! A conductor that finishes a task is expected to publish an operation
//! chain. Arming starts a single-shot timer; an arriving
//! `CLUSTER_OPERATIONS` cancels it; firing publishes exactly one
//! `CLUSTER_FAILED { reason: CONDUCTOR_WATCHDOG_TIMEOUT }`.

use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zs_core::payload::FromData;
use zs_core::{Clock, FailurePayload, MessageDraft, Topic, SENDER_ORCHESTRATOR};
use zs_ledger::MessageBus;

pub const CONDUCTOR_WATCHDOG_REASON: &str = "CONDUCTOR_WATCHDOG_TIMEOUT";

#[derive(Default)]
pub(crate) struct ConductorWatchdog {
    armed: Mutex<Option<CancellationToken>>,
}

impl ConductorWatchdog {
    /// Arm (or re-arm) the timer. Firing publishes the failure on `bus`.
    pub(crate) fn arm<C: Clock>(&self, bus: MessageBus<C>, timeout: Duration) {
        let token = CancellationToken::new();
        let watch = token.clone();
        if let Some(previous) = self.armed.lock().replace(token) {
            previous.cancel();
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = watch.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(
                        cluster = %bus.cluster_id(),
                        "conductor produced no operation chain within {}s",
                        timeout.as_secs_f32(),
                    );
                    let payload = FailurePayload {
                        reason: CONDUCTOR_WATCHDOG_REASON.to_string(),
                        detail: Some("conductor completed without CLUSTER_OPERATIONS".to_string()),
                    };
                    let draft = MessageDraft::new(Topic::CLUSTER_FAILED, SENDER_ORCHESTRATOR)
                        .data(payload.to_data());
                    if let Err(e) = bus.publish(draft) {
                        tracing::warn!(error = %e, "watchdog failure publish failed");
                    }
                }
            }
        });
    }

    /// Cancel the pending timer, if any.
    pub(crate) fn cancel(&self) {
        if let Some(token) = self.armed.lock().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
