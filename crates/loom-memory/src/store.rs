// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use loom_model::Message;

/// Identity of a conversation thread: the owning resource (user, project)
/// plus a thread id unique within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadKey {
    pub resource_id: String,
    pub thread_id: String,
}

impl ThreadKey {
    pub fn new(resource_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self { resource_id: resource_id.into(), thread_id: thread_id.into() }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_id, self.thread_id)
    }
}

/// A message as persisted in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Position in the thread, starting at 1 and strictly increasing.
    pub ordinal: u64,
    pub created_at: DateTime<Utc>,
    pub message: Message,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored message {ordinal} in {key} is corrupt: {reason}")]
    Corrupt { key: ThreadKey, ordinal: u64, reason: String },
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Backend(e.to_string())
    }
}

/// Append-only, per-thread conversation history.
///
/// Appends to one key are serialised: every returned ordinal is greater than
/// all ordinals previously handed out for that key, even under concurrent
/// callers.  Different keys never contend with each other.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one message and return it with its assigned ordinal.
    async fn append(&self, key: &ThreadKey, message: Message) -> Result<StoredMessage, MemoryError>;

    /// Append several messages contiguously, in order, inside one critical
    /// section.  An empty batch is a no-op.
    async fn append_many(
        &self,
        key: &ThreadKey,
        messages: Vec<Message>,
    ) -> Result<Vec<StoredMessage>, MemoryError>;

    /// Ordered snapshot of a thread.  Unknown threads read as empty.
    async fn read(&self, key: &ThreadKey) -> Result<Vec<StoredMessage>, MemoryError>;

    /// Thread ids known for `resource_id`, sorted.
    async fn threads(&self, resource_id: &str) -> Result<Vec<String>, MemoryError>;
}
