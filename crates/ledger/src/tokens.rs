// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token usage aggregation over the `TOKEN_USAGE` topic.

use crate::criteria::MessageQuery;
use crate::store::{Ledger, LedgerError};
use std::collections::HashMap;
use zs_core::payload::FromData;
use zs_core::{Clock, ClusterId, TokenUsagePayload, Topic};

/// Bucket name aggregating every role.
pub const TOTAL_BUCKET: &str = "_total";

/// Per-role token usage totals, plus a `_total` bucket.
pub type TokensByRole = HashMap<String, TokenUsagePayload>;

impl<C: Clock> Ledger<C> {
    /// Sum `TOKEN_USAGE` payloads per role. Messages whose payload does not
    /// parse are skipped.
    pub fn tokens_by_role(&self, cluster_id: &ClusterId) -> Result<TokensByRole, LedgerError> {
        let messages = self
            .query(&MessageQuery::for_cluster(cluster_id.clone()).topic(Topic::TOKEN_USAGE))?;

        let mut by_role: TokensByRole = HashMap::new();
        let mut total = TokenUsagePayload { role: TOTAL_BUCKET.to_string(), ..Default::default() };

        for msg in &messages {
            let Some(usage) = TokenUsagePayload::from_message(msg) else {
                tracing::debug!(id = %msg.id, "skipping unparseable TOKEN_USAGE payload");
                continue;
            };
            total.add(&usage);
            by_role
                .entry(usage.role.clone())
                .or_insert_with(|| TokenUsagePayload { role: usage.role.clone(), ..Default::default() })
                .add(&usage);
        }

        by_role.insert(TOTAL_BUCKET.to_string(), total);
        Ok(by_role)
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
