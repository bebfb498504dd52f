// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed message store.
//!
//! One file per cluster, WAL journaling for concurrent readers. Appends are
//! serialized through an outer publish lock so that commit order and signal
//! order agree; subscribers run synchronously after the commit and must not
//! append from inside a callback (hand work to a channel instead).

use crate::criteria::{MessageQuery, SortOrder};
use crate::signals::{Signals, Subscription};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use zs_core::{Clock, ClusterId, Message, MessageContent, MessageDraft, MessageId, SystemClock, Topic};

/// Journal mode override: `ZEROSHOT_SQLITE_JOURNAL_MODE` (default `WAL`).
fn journal_mode() -> String {
    std::env::var("ZEROSHOT_SQLITE_JOURNAL_MODE").unwrap_or_else(|_| "WAL".to_string())
}

/// Busy timeout override: `ZEROSHOT_SQLITE_BUSY_TIMEOUT_MS` (default 5000).
fn busy_timeout() -> Duration {
    let ms = std::env::var("ZEROSHOT_SQLITE_BUSY_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5_000);
    Duration::from_millis(ms)
}

/// WAL autocheckpoint override: `ZEROSHOT_SQLITE_WAL_AUTOCHECKPOINT_PAGES`
/// (default 1000).
fn wal_autocheckpoint_pages() -> u32 {
    std::env::var("ZEROSHOT_SQLITE_WAL_AUTOCHECKPOINT_PAGES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(1_000)
}

/// Errors surfaced by ledger reads and writes.
///
/// A closed ledger is not an error: writers get `Ok(None)` back and accept
/// the loss (teardown races are expected).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored blob is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

struct Inner {
    conn: Connection,
    last_timestamp: u64,
}

/// Durable, totally ordered, append-only message log.
pub struct Ledger<C: Clock = SystemClock> {
    path: PathBuf,
    inner: Mutex<Inner>,
    /// Serializes append→signal sequences so signal order matches commit order.
    publish_lock: Mutex<()>,
    signals: Signals,
    closed: AtomicBool,
    clock: C,
}

impl Ledger<SystemClock> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open_with_clock(path, SystemClock)
    }
}

impl<C: Clock> Ledger<C> {
    pub fn open_with_clock(path: impl AsRef<Path>, clock: C) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                        Some(format!("cannot create {}: {e}", parent.display())),
                    )
                })?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout())?;
        conn.pragma_update(None, "journal_mode", journal_mode())?;
        conn.pragma_update(None, "wal_autocheckpoint", wal_autocheckpoint_pages())?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id           TEXT PRIMARY KEY,
                timestamp    INTEGER NOT NULL,
                topic        TEXT NOT NULL,
                sender       TEXT NOT NULL,
                receiver     TEXT NOT NULL,
                content_text TEXT,
                content_data TEXT,
                metadata     TEXT,
                cluster_id   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_cluster_ts
                ON messages(cluster_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_cluster_topic
                ON messages(cluster_id, topic);
            CREATE INDEX IF NOT EXISTS idx_messages_cluster_sender
                ON messages(cluster_id, sender);",
        )?;
        // Resume the timestamp sequence where a previous process left off.
        let last_timestamp: u64 = conn
            .query_row("SELECT COALESCE(MAX(timestamp), 0) FROM messages", [], |row| {
                row.get::<_, i64>(0)
            })? as u64;
        Ok(Self {
            path,
            inner: Mutex::new(Inner { conn, last_timestamp }),
            publish_lock: Mutex::new(()),
            signals: Signals::new(),
            closed: AtomicBool::new(false),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the ledger. Terminal: later appends return `Ok(None)` silently.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.lock();
        if let Err(e) = inner.conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
            tracing::debug!(path = %self.path.display(), error = %e, "final wal checkpoint failed");
        }
    }

    /// Append one message. Returns the materialized message, or `None` when
    /// the ledger is closed.
    pub fn append(
        &self,
        cluster_id: &ClusterId,
        draft: MessageDraft,
    ) -> Result<Option<Message>, LedgerError> {
        let appended = self.batch_append(cluster_id, vec![draft])?;
        Ok(appended.and_then(|mut batch| batch.pop()))
    }

    /// Append a batch atomically: contiguous ascending timestamps, all
    /// visible (and all signals fired, in order) only after the commit.
    /// Returns `None` when the ledger is closed.
    pub fn batch_append(
        &self,
        cluster_id: &ClusterId,
        drafts: Vec<MessageDraft>,
    ) -> Result<Option<Vec<Message>>, LedgerError> {
        if drafts.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let _publish = self.publish_lock.lock();
        if self.is_closed() {
            return Ok(None);
        }

        let messages = {
            let mut inner = self.inner.lock();
            let mut ts = inner.last_timestamp.saturating_add(1).max(self.clock.epoch_ms());
            // A caller-supplied timestamp on the first draft is honored only
            // if strictly greater than the sequence so far.
            if let Some(wanted) = drafts.first().and_then(|d| d.timestamp) {
                if wanted > inner.last_timestamp {
                    ts = wanted;
                }
            }

            let mut messages = Vec::with_capacity(drafts.len());
            let tx = inner.conn.transaction()?;
            for (i, draft) in drafts.into_iter().enumerate() {
                let msg = draft.materialize(cluster_id.clone(), ts + i as u64);
                insert_message(&tx, &msg)?;
                messages.push(msg);
            }
            tx.commit()?;
            inner.last_timestamp = ts + (messages.len() as u64 - 1);
            messages
        };

        for msg in &messages {
            self.signals.emit(msg);
        }
        Ok(Some(messages))
    }

    /// Subscribe to every appended message.
    pub fn subscribe(&self, callback: impl Fn(&Message) + Send + Sync + 'static) -> Subscription {
        self.signals.subscribe(callback)
    }

    /// Subscribe to one topic's messages.
    pub fn subscribe_topic(
        &self,
        topic: impl Into<Topic>,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.signals.subscribe_topic(topic.into(), callback)
    }

    /// Filtered read over one cluster's slice of the log.
    pub fn query(&self, criteria: &MessageQuery) -> Result<Vec<Message>, LedgerError> {
        let mut sql = String::from(
            "SELECT id, timestamp, topic, sender, receiver, content_text, content_data, \
             metadata, cluster_id FROM messages WHERE cluster_id = ?1",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(criteria.cluster_id.as_str().to_string())];

        if let Some(topic) = &criteria.topic {
            args.push(Box::new(topic.clone()));
            sql.push_str(&format!(" AND topic = ?{}", args.len()));
        }
        if let Some(sender) = &criteria.sender {
            args.push(Box::new(sender.clone()));
            sql.push_str(&format!(" AND sender = ?{}", args.len()));
        }
        if let Some(receiver) = &criteria.receiver {
            args.push(Box::new(receiver.clone()));
            sql.push_str(&format!(" AND receiver = ?{}", args.len()));
        }
        if let Some(since) = criteria.since {
            args.push(Box::new(since as i64));
            sql.push_str(&format!(" AND timestamp >= ?{}", args.len()));
        }
        if let Some(until) = criteria.until {
            args.push(Box::new(until as i64));
            sql.push_str(&format!(" AND timestamp <= ?{}", args.len()));
        }
        sql.push_str(&format!(" ORDER BY timestamp {}", criteria.order.sql()));
        if let Some(limit) = criteria.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = criteria.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        } else if let Some(offset) = criteria.offset {
            sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
        }

        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// The most recent message matching the criteria, if any.
    pub fn find_last(&self, criteria: &MessageQuery) -> Result<Option<Message>, LedgerError> {
        let mut criteria = criteria.clone();
        criteria.order = SortOrder::Desc;
        criteria.limit = Some(1);
        criteria.offset = None;
        Ok(self.query(&criteria)?.pop())
    }

    pub fn count(&self, criteria: &MessageQuery) -> Result<u64, LedgerError> {
        let mut sql = String::from("SELECT COUNT(*) FROM messages WHERE cluster_id = ?1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(criteria.cluster_id.as_str().to_string())];
        if let Some(topic) = &criteria.topic {
            args.push(Box::new(topic.clone()));
            sql.push_str(&format!(" AND topic = ?{}", args.len()));
        }
        if let Some(sender) = &criteria.sender {
            args.push(Box::new(sender.clone()));
            sql.push_str(&format!(" AND sender = ?{}", args.len()));
        }
        if let Some(since) = criteria.since {
            args.push(Box::new(since as i64));
            sql.push_str(&format!(" AND timestamp >= ?{}", args.len()));
        }
        let inner = self.inner.lock();
        let refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let count: i64 = inner.conn.query_row(&sql, refs.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All of a cluster's messages in append order.
    pub fn get_all(&self, cluster_id: &ClusterId) -> Result<Vec<Message>, LedgerError> {
        self.query(&MessageQuery::for_cluster(cluster_id.clone()))
    }

    /// Messages at or after `timestamp`, in append order.
    pub fn since(&self, cluster_id: &ClusterId, timestamp: u64) -> Result<Vec<Message>, LedgerError> {
        self.query(&MessageQuery::for_cluster(cluster_id.clone()).since(timestamp))
    }

    /// The most recent messages across every cluster in this store, newest
    /// last. Used by the polling observer's first tick when no cluster
    /// filter is given.
    pub(crate) fn tail_all_clusters(&self, count: usize) -> Result<Vec<Message>, LedgerError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare(
            "SELECT id, timestamp, topic, sender, receiver, content_text, content_data, \
             metadata, cluster_id FROM messages ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![count as i64], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        out.reverse();
        Ok(out)
    }

    /// Messages at or after `timestamp` across every cluster in this store.
    pub(crate) fn since_all_clusters(&self, timestamp: u64) -> Result<Vec<Message>, LedgerError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare(
            "SELECT id, timestamp, topic, sender, receiver, content_text, content_data, \
             metadata, cluster_id FROM messages WHERE timestamp >= ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![timestamp as i64], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }
}

fn insert_message(conn: &Connection, msg: &Message) -> Result<(), LedgerError> {
    let content_data = match &msg.content.data {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    };
    let metadata = match &msg.metadata {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    };
    conn.execute(
        "INSERT INTO messages \
         (id, timestamp, topic, sender, receiver, content_text, content_data, metadata, cluster_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            msg.id.as_str(),
            msg.timestamp as i64,
            msg.topic.as_str(),
            msg.sender,
            msg.receiver,
            msg.content.text,
            content_data,
            metadata,
            msg.cluster_id.as_str(),
        ],
    )?;
    Ok(())
}

type RowResult = Result<Message, LedgerError>;

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult> {
    let id: String = row.get(0)?;
    let timestamp: i64 = row.get(1)?;
    let topic: String = row.get(2)?;
    let sender: String = row.get(3)?;
    let receiver: String = row.get(4)?;
    let content_text: Option<String> = row.get(5)?;
    let content_data: Option<String> = row.get(6)?;
    let metadata: Option<String> = row.get(7)?;
    let cluster_id: String = row.get(8)?;

    Ok((|| {
        let data = content_data.as_deref().map(serde_json::from_str).transpose()?;
        let metadata = metadata.as_deref().map(serde_json::from_str).transpose()?;
        Ok(Message {
            id: MessageId::from_string(id),
            timestamp: timestamp as u64,
            cluster_id: ClusterId::new(cluster_id),
            topic: Topic::new(topic),
            sender,
            receiver,
            content: MessageContent { text: content_text, data },
            metadata,
        })
    })())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
