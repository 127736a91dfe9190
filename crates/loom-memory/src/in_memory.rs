// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use loom_model::Message;

use crate::{MemoryError, MemoryStore, StoredMessage, ThreadKey};

type Thread = Arc<Mutex<Vec<StoredMessage>>>;

/// Process-local store.  Each thread has its own lock; the outer map lock is
/// held only long enough to find or create a thread.
#[derive(Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<ThreadKey, Thread>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn thread(&self, key: &ThreadKey) -> Thread {
        if let Some(t) = self.threads.read().await.get(key) {
            return Arc::clone(t);
        }
        let mut map = self.threads.write().await;
        Arc::clone(map.entry(key.clone()).or_default())
    }

    async fn existing(&self, key: &ThreadKey) -> Option<Thread> {
        self.threads.read().await.get(key).cloned()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
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
        let thread = self.thread(key).await;
        let mut log = thread.lock().await;
        let mut next = log.last().map(|m| m.ordinal).unwrap_or(0);
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            next += 1;
            let stored = StoredMessage { ordinal: next, created_at: Utc::now(), message };
            log.push(stored.clone());
            out.push(stored);
        }
        Ok(out)
    }

    async fn read(&self, key: &ThreadKey) -> Result<Vec<StoredMessage>, MemoryError> {
        match self.existing(key).await {
            Some(thread) => Ok(thread.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn threads(&self, resource_id: &str) -> Result<Vec<String>, MemoryError> {
        let mut ids: Vec<String> = self
            .threads
            .read()
            .await
            .keys()
            .filter(|k| k.resource_id == resource_id)
            .map(|k| k.thread_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key(t: &str) -> ThreadKey {
        ThreadKey::new("demo-user", t)
    }

    #[tokio::test]
    async fn unknown_thread_reads_empty() {
        let store = InMemoryStore::new();
        assert!(store.read(&key("nope")).await.unwrap().is_empty());
        // Reading must not create the thread.
        assert!(store.threads("demo-user").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ordinals_start_at_one_and_increase() {
        let store = InMemoryStore::new();
        let a = store.append(&key("t"), Message::user("a")).await.unwrap();
        let b = store.append(&key("t"), Message::assistant("b")).await.unwrap();
        assert_eq!(a.ordinal, 1);
        assert_eq!(b.ordinal, 2);
        let snapshot = store.read(&key("t")).await.unwrap();
        assert_eq!(snapshot, vec![a, b]);
    }

    #[tokio::test]
    async fn threads_are_independent() {
        let store = InMemoryStore::new();
        store.append(&key("one"), Message::user("x")).await.unwrap();
        let first_in_two = store.append(&key("two"), Message::user("y")).await.unwrap();
        assert_eq!(first_in_two.ordinal, 1);
        assert_eq!(store.threads("demo-user").await.unwrap(), vec!["one", "two"]);
        assert!(store.threads("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_many_is_contiguous() {
        let store = InMemoryStore::new();
        store.append(&key("t"), Message::user("q")).await.unwrap();
        let batch = store
            .append_many(&key("t"), vec![Message::assistant("1"), Message::assistant("2")])
            .await
            .unwrap();
        let ords: Vec<u64> = batch.iter().map(|m| m.ordinal).collect();
        assert_eq!(ords, vec![2, 3]);
        assert!(store.append_many(&key("t"), vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_are_gap_free() {
        let store = Arc::new(InMemoryStore::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.append(&key("busy"), Message::user(format!("m{i}"))).await.unwrap().ordinal
            }));
        }
        let mut seen = Vec::new();
        for t in tasks {
            seen.push(t.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=32).collect::<Vec<u64>>());

        let log = store.read(&key("busy")).await.unwrap();
        assert!(log.windows(2).all(|w| w[0].ordinal < w[1].ordinal));
    }
}
