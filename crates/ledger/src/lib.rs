// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zs-ledger: Durable per-cluster message log with in-process pub/sub.
//!
//! One SQLite file per cluster holds a totally ordered, append-only message
//! log. In-process observers attach synchronous subscription signals;
//! cross-process observers poll with id-deduplication. The [`MessageBus`]
//! is the cluster-stamping facade everything above this crate publishes
//! through.

pub mod bus;
pub mod criteria;
pub mod poll;
pub mod signals;
pub mod store;
pub mod tokens;

pub use bus::MessageBus;
pub use criteria::{MessageQuery, SortOrder};
pub use poll::PollHandle;
pub use signals::Subscription;
pub use store::{Ledger, LedgerError};
pub use tokens::TokensByRole;
