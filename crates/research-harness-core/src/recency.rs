//! Recency store: append-only memory of finished research runs.
//!
//! Entries are `(query, report, timestamp)` with a fresh UUID. Listing is
//! always newest first. The Context-Analysis stage reads the most recent
//! window of entries; the caller of the pipeline writes one entry per run.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{MemoryEntry, MemoryPage};

#[async_trait]
pub trait RecencyStore: Send + Sync {
    /// Append a new entry with a fresh id and the current time.
    async fn store(&self, query: &str, report: &str) -> Result<MemoryEntry>;

    /// Every entry, newest first.
    async fn list(&self) -> Result<Vec<MemoryEntry>>;

    /// One page of entries, newest first, plus the total count.
    async fn list_page(&self, limit: usize, offset: usize) -> Result<MemoryPage>;

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>>;

    /// Remove every entry, returning how many were removed.
    async fn clear(&self) -> Result<usize>;

    /// The `n` most recent entries.
    async fn recent(&self, n: usize) -> Result<Vec<MemoryEntry>> {
        Ok(self.list_page(n, 0).await?.entries)
    }
}

impl MemoryEntry {
    /// Build an entry with a fresh UUID stamped with the current time.
    pub fn new(query: &str, report: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            report: report.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Volatile recency store. Entries are kept in insertion order, so two
/// entries with the same timestamp still list in the order they were stored.
#[derive(Default)]
pub struct InMemoryRecencyStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl InMemoryRecencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<MemoryEntry>>> {
        self.entries.read().map_err(|_| anyhow!("recency store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<MemoryEntry>>> {
        self.entries.write().map_err(|_| anyhow!("recency store lock poisoned"))
    }
}

#[async_trait]
impl RecencyStore for InMemoryRecencyStore {
    async fn store(&self, query: &str, report: &str) -> Result<MemoryEntry> {
        let entry = MemoryEntry::new(query, report);
        self.write()?.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<MemoryEntry>> {
        Ok(self.read()?.iter().rev().cloned().collect())
    }

    async fn list_page(&self, limit: usize, offset: usize) -> Result<MemoryPage> {
        let entries = self.read()?;
        Ok(MemoryPage {
            total: entries.len(),
            entries: entries.iter().rev().skip(offset).take(limit).cloned().collect(),
        })
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        Ok(self.read()?.iter().find(|e| e.id == id).cloned())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newest_entry_lists_first() {
        let store = InMemoryRecencyStore::new();
        store.store("first", "r1").await.unwrap();
        let second = store.store("second", "r2").await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], second);
        assert_eq!(all[1].query, "first");
    }

    #[tokio::test]
    async fn ids_are_unique_and_lookup_works() {
        let store = InMemoryRecencyStore::new();
        let a = store.store("q", "r").await.unwrap();
        let b = store.store("q", "r").await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.get(&a.id).await.unwrap(), Some(a));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn recent_window_and_pagination() {
        let store = InMemoryRecencyStore::new();
        for i in 0..8 {
            store.store(&format!("q{}", i), "r").await.unwrap();
        }

        let recent = store.recent(5).await.unwrap();
        let queries: Vec<_> = recent.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["q7", "q6", "q5", "q4", "q3"]);

        let page = store.list_page(3, 6).await.unwrap();
        assert_eq!(page.total, 8);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].query, "q1");
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = InMemoryRecencyStore::new();
        store.store("q", "r").await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());
    }
}
