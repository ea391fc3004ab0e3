//! In-memory [`ChunkStore`] implementation for tests and throwaway sessions.
//!
//! Chunks and vectors live in one `Vec` behind a `std::sync::RwLock`, so a
//! batch insert happens under a single write guard and readers never see a
//! partial batch. Vector search is brute-force cosine similarity.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::ContentChunk;

use super::{sort_candidates, ChunkCandidate, ChunkStore};

struct StoredChunk {
    chunk: ContentChunk,
    vector: Vec<f32>,
}

/// In-memory chunk store.
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<StoredChunk>>> {
        self.chunks.read().map_err(|_| anyhow!("chunk store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<StoredChunk>>> {
        self.chunks.write().map_err(|_| anyhow!("chunk store lock poisoned"))
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn find_existing(&self, source: &str, fingerprint: &str) -> Result<Option<String>> {
        let chunks = self.read()?;
        Ok(chunks
            .iter()
            .find(|s| s.chunk.source == source && s.chunk.fingerprint == fingerprint)
            .map(|s| s.chunk.id.clone()))
    }

    async fn insert_batch(&self, batch: &[(ContentChunk, Vec<f32>)]) -> Result<Vec<String>> {
        let mut chunks = self.write()?;
        let mut ids = Vec::with_capacity(batch.len());

        for (chunk, vector) in batch {
            let existing = chunks
                .iter()
                .find(|s| s.chunk.source == chunk.source && s.chunk.fingerprint == chunk.fingerprint)
                .map(|s| s.chunk.id.clone());

            match existing {
                Some(id) => ids.push(id),
                None => {
                    ids.push(chunk.id.clone());
                    chunks.push(StoredChunk {
                        chunk: chunk.clone(),
                        vector: vector.clone(),
                    });
                }
            }
        }
        Ok(ids)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        let chunks = self.read()?;
        let mut candidates: Vec<ChunkCandidate> = chunks
            .iter()
            .map(|s| ChunkCandidate {
                chunk: s.chunk.clone(),
                raw_score: cosine_similarity(query_vec, &s.vector),
            })
            .collect();
        drop(chunks);

        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn sample_sources(&self, limit: usize) -> Result<Vec<String>> {
        let chunks = self.read()?;
        let mut sources: Vec<String> = chunks.iter().map(|s| s.chunk.source.clone()).collect();
        sources.sort();
        sources.dedup();
        sources.truncate(limit);
        Ok(sources)
    }

    async fn delete_source(&self, source: &str) -> Result<usize> {
        let mut chunks = self.write()?;
        let before = chunks.len();
        chunks.retain(|s| s.chunk.source != source);
        Ok(before - chunks.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut chunks = self.write()?;
        let removed = chunks.len();
        chunks.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, index: i64, text: &str) -> ContentChunk {
        ContentChunk::new(source, index, text)
    }

    #[tokio::test]
    async fn duplicate_fingerprint_keeps_first_id() {
        let store = InMemoryChunkStore::new();
        let first = chunk("a.txt", 0, "hello");
        let again = chunk("a.txt", 0, "hello");

        let ids = store.insert_batch(&[(first.clone(), vec![1.0, 0.0])]).await.unwrap();
        let ids_again = store.insert_batch(&[(again, vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(ids, vec![first.id.clone()]);
        assert_eq!(ids_again, vec![first.id]);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_text_from_other_source_is_distinct() {
        let store = InMemoryChunkStore::new();
        store
            .insert_batch(&[
                (chunk("a.txt", 0, "shared"), vec![1.0]),
                (chunk("b.txt", 0, "shared"), vec![1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.sample_sources(10).await.unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn vector_search_orders_by_score_then_source() {
        let store = InMemoryChunkStore::new();
        store
            .insert_batch(&[
                (chunk("z.txt", 0, "far"), vec![0.0, 1.0]),
                (chunk("b.txt", 0, "near b"), vec![1.0, 0.0]),
                (chunk("a.txt", 0, "near a"), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.vector_search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source, "a.txt");
        assert_eq!(hits[1].chunk.source, "b.txt");
    }

    #[tokio::test]
    async fn delete_and_clear_report_removed_counts() {
        let store = InMemoryChunkStore::new();
        store
            .insert_batch(&[
                (chunk("a.txt", 0, "one"), vec![1.0]),
                (chunk("a.txt", 1, "two"), vec![1.0]),
                (chunk("b.txt", 0, "three"), vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_source("a.txt").await.unwrap(), 2);
        assert_eq!(store.delete_source("a.txt").await.unwrap(), 0);
        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
