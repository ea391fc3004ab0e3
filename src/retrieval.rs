//! Retrieval engine: ingestion, threshold search, context assembly, and
//! maintenance over a [`ChunkStore`] and an [`Embedder`].
//!
//! Writes (`add`, `delete`, `clear_all`) are serialized by a write gate so
//! the "is this chunk already stored?" check and the insert cannot interleave
//! between two concurrent ingestions. Reads do not take the gate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use research_harness_core::embedding::Embedder;
use research_harness_core::models::{ContentChunk, RetrievalResult};
use research_harness_core::retrieval::{assemble_context, similarity_search, AssembledContext};
use research_harness_core::store::ChunkStore;

use crate::config::RetrievalConfig;

/// Read-only snapshot of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    pub total_chunks: usize,
    pub collection: String,
    pub embedding_model: String,
    pub persist_location: String,
    pub sample_sources: Vec<String>,
}

pub struct RetrievalEngine {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    settings: RetrievalConfig,
    write_gate: Mutex<()>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        settings: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
            write_gate: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &RetrievalConfig {
        &self.settings
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Store `chunks`, returning one id per non-blank chunk in input order.
    ///
    /// Whitespace-only chunks are dropped. A chunk whose `(source,
    /// fingerprint)` is already stored, or repeated earlier in the same call,
    /// maps to the existing id and is not embedded again.
    pub async fn add(&self, chunks: Vec<ContentChunk>) -> Result<Vec<String>> {
        let chunks: Vec<ContentChunk> = chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let _gate = self.write_gate.lock().await;

        // Resolve each input to an existing id or a slot in `fresh`.
        enum Slot {
            Existing(String),
            Fresh(usize),
        }
        let mut slots = Vec::with_capacity(chunks.len());
        let mut fresh: Vec<ContentChunk> = Vec::new();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();

        for chunk in chunks {
            if let Some(id) = self.store.find_existing(&chunk.source, &chunk.fingerprint).await? {
                slots.push(Slot::Existing(id));
                continue;
            }
            let key = (chunk.source.clone(), chunk.fingerprint.clone());
            let pos = *seen.entry(key).or_insert_with(|| {
                fresh.push(chunk);
                fresh.len() - 1
            });
            slots.push(Slot::Fresh(pos));
        }

        let mut fresh_ids = Vec::new();
        if !fresh.is_empty() {
            let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != fresh.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    fresh.len()
                );
            }
            let batch: Vec<(ContentChunk, Vec<f32>)> = fresh.into_iter().zip(vectors).collect();
            fresh_ids = self.store.insert_batch(&batch).await?;
            info!(inserted = batch.len(), "stored new chunks");
        }

        Ok(slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Existing(id) => id,
                Slot::Fresh(pos) => fresh_ids[pos].clone(),
            })
            .collect())
    }

    /// Top-`k` chunks with relevance `>= threshold`, best first.
    ///
    /// A blank query returns no results without calling the embedder.
    pub async fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(query).await?;
        let results = similarity_search(self.store.as_ref(), &query_vec, k, threshold).await?;
        debug!(k, threshold, hits = results.len(), "similarity search");
        Ok(results)
    }

    /// Search with the configured `search_k` and `search_threshold`.
    pub async fn search_default(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.search(query, self.settings.search_k, self.settings.search_threshold)
            .await
    }

    /// Token-budgeted context for `query`, built from the configured
    /// `context_k` best chunks above `context_threshold`.
    pub async fn assemble(&self, query: &str, token_budget: usize) -> Result<AssembledContext> {
        let results = self
            .search(query, self.settings.context_k, self.settings.context_threshold)
            .await?;
        Ok(assemble_context(&results, token_budget))
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }

    pub async fn stats(&self) -> Result<RetrievalStats> {
        Ok(RetrievalStats {
            total_chunks: self.store.count().await?,
            collection: self.settings.collection.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            persist_location: self.store.location(),
            sample_sources: self.store.sample_sources(10).await?,
        })
    }

    /// Remove every chunk from `source`.
    pub async fn delete(&self, source: &str) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        let removed = self.store.delete_source(source).await?;
        info!(%source, removed, "deleted source");
        Ok(removed)
    }

    /// Remove every chunk.
    pub async fn clear_all(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        let removed = self.store.clear().await?;
        info!(removed, "cleared retrieval store");
        Ok(removed)
    }
}
