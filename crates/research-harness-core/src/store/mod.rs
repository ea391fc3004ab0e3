//! Chunk storage abstraction for the retrieval engine.
//!
//! The [`ChunkStore`] trait defines every storage operation the retrieval
//! engine needs, so the engine can run over SQLite in the application and
//! over the in-memory store in tests.
//!
//! Implementations must be `Send + Sync` and must make each
//! [`insert_batch`](ChunkStore::insert_batch) atomic with respect to readers:
//! a concurrent [`vector_search`](ChunkStore::vector_search) sees either none
//! or all of a batch.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ContentChunk;

/// A stored chunk with its raw cosine similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk: ContentChunk,
    /// Cosine similarity in `[-1.0, 1.0]`, before relevance clamping.
    pub raw_score: f32,
}

/// Abstract chunk + embedding storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_existing`](ChunkStore::find_existing) | Look up a chunk id by `(source, fingerprint)` |
/// | [`insert_batch`](ChunkStore::insert_batch) | Atomically insert chunks with their vectors |
/// | [`vector_search`](ChunkStore::vector_search) | Top-`limit` candidates by cosine similarity |
/// | [`count`](ChunkStore::count) | Total stored chunks |
/// | [`sample_sources`](ChunkStore::sample_sources) | Distinct source identifiers |
/// | [`delete_source`](ChunkStore::delete_source) | Remove every chunk of one source |
/// | [`clear`](ChunkStore::clear) | Remove every chunk |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Human-readable persistence location (a file path, or `"memory"`).
    fn location(&self) -> String;

    /// Return the id of a stored chunk with this source and fingerprint.
    async fn find_existing(&self, source: &str, fingerprint: &str) -> Result<Option<String>>;

    /// Insert chunks with their embedding vectors in one atomic step.
    ///
    /// Returns the stored id for each input, in order. A chunk whose
    /// `(source, fingerprint)` is already present is not inserted again and
    /// the existing id is returned instead.
    async fn insert_batch(&self, batch: &[(ContentChunk, Vec<f32>)]) -> Result<Vec<String>>;

    /// Return up to `limit` candidates ordered by descending raw score.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>>;

    async fn count(&self) -> Result<usize>;

    /// Return up to `limit` distinct sources, sorted ascending.
    async fn sample_sources(&self, limit: usize) -> Result<Vec<String>>;

    /// Delete every chunk from `source`, returning how many were removed.
    async fn delete_source(&self, source: &str) -> Result<usize>;

    /// Delete every chunk, returning how many were removed.
    async fn clear(&self) -> Result<usize>;
}

/// Sort candidates by descending score, breaking ties by source then index
/// so results are deterministic.
pub fn sort_candidates(candidates: &mut [ChunkCandidate]) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.source.cmp(&b.chunk.source))
            .then_with(|| a.chunk.index.cmp(&b.chunk.index))
    });
}
