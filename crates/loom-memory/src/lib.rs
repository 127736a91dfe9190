// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod store;
mod in_memory;
mod sqlite;

use std::sync::Arc;

use anyhow::Context;

use loom_config::{MemoryBackend, MemoryConfig};

pub use store::{MemoryError, MemoryStore, StoredMessage, ThreadKey};
pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Construct the configured memory backend.
pub fn from_config(cfg: &MemoryConfig) -> anyhow::Result<Arc<dyn MemoryStore>> {
    match cfg.backend {
        MemoryBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        MemoryBackend::Sqlite => {
            let path = loom_config::expand_path(&cfg.path)?;
            let store = SqliteStore::open(&path)
                .with_context(|| format!("opening memory database {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}
