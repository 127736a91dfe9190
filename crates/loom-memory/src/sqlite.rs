// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use loom_model::Message;

use crate::{MemoryError, MemoryStore, StoredMessage, ThreadKey};

/// SQLite-backed thread history.
///
/// One row per message keyed by `(resource_id, thread_id, ordinal)`.  The
/// connection sits behind a mutex and every operation runs on the blocking
/// pool; appends compute `MAX(ordinal) + 1` inside a transaction, so the
/// primary key doubles as a guard against duplicate ordinals.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MemoryError::Backend(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        info!(path = %path.display(), "opened sqlite memory store");
        Self::with_connection(conn)
    }

    /// A private database that disappears when the store is dropped.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, MemoryError> {
        migrate(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| MemoryError::Backend("sqlite connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| MemoryError::Backend(format!("sqlite task failed: {e}")))?
    }
}

fn migrate(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            resource_id TEXT NOT NULL,
            thread_id   TEXT NOT NULL,
            ordinal     INTEGER NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (resource_id, thread_id, ordinal)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_resource ON messages(resource_id);
        "#,
    )?;
    Ok(())
}

fn insert_batch(
    conn: &mut Connection,
    key: &ThreadKey,
    messages: Vec<Message>,
) -> Result<Vec<StoredMessage>, MemoryError> {
    let tx = conn.transaction()?;
    let last: Option<i64> = tx
        .query_row(
            "SELECT MAX(ordinal) FROM messages WHERE resource_id = ?1 AND thread_id = ?2",
            params![key.resource_id, key.thread_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let mut next = last.unwrap_or(0);

    let mut out = Vec::with_capacity(messages.len());
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO messages (resource_id, thread_id, ordinal, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for message in messages {
            next += 1;
            let created_at = Utc::now();
            let content = serde_json::to_string(&message)
                .map_err(|e| MemoryError::Backend(format!("encoding message: {e}")))?;
            stmt.execute(params![
                key.resource_id,
                key.thread_id,
                next,
                message.role.as_str(),
                content,
                created_at.to_rfc3339(),
            ])?;
            out.push(StoredMessage { ordinal: next as u64, created_at, message });
        }
    }
    tx.commit()?;
    debug!(thread = %key, count = out.len(), last_ordinal = next, "appended messages");
    Ok(out)
}

fn decode_row(
    key: &ThreadKey,
    ordinal: i64,
    content: &str,
    created_at: &str,
) -> Result<StoredMessage, MemoryError> {
    let corrupt = |reason: String| MemoryError::Corrupt {
        key: key.clone(),
        ordinal: ordinal as u64,
        reason,
    };
    let message: Message = serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|e| corrupt(e.to_string()))?
        .with_timezone(&Utc);
    Ok(StoredMessage { ordinal: ordinal as u64, created_at, message })
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn append(&self, key: &ThreadKey, message: Message) -> Result<StoredMessage, MemoryError> {
        let mut stored = self.append_many(key, vec![message]).await?;
        stored
            .pop()
            .ok_or_else(|| MemoryError::Backend("append produced no message".into()))
    }

    async fn append_many(
        &self,
        key: &ThreadKey,
        messages: Vec<Message>,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let key = key.clone();
        self.with_conn(move |conn| insert_batch(conn, &key, messages)).await
    }

    async fn read(&self, key: &ThreadKey) -> Result<Vec<StoredMessage>, MemoryError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT ordinal, content, created_at FROM messages
                 WHERE resource_id = ?1 AND thread_id = ?2
                 ORDER BY ordinal ASC",
            )?;
            let rows = stmt.query_map(params![key.resource_id, key.thread_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (ordinal, content, created_at) = row?;
                out.push(decode_row(&key, ordinal, &content, &created_at)?);
            }
            Ok(out)
        })
        .await
    }

    async fn threads(&self, resource_id: &str) -> Result<Vec<String>, MemoryError> {
        let resource_id = resource_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT thread_id FROM messages WHERE resource_id = ?1 ORDER BY thread_id",
            )?;
            let ids = stmt
                .query_map(params![resource_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
