//! Core data models shared by the retrieval engine and the recency store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded segment of source text, stored with its embedding.
///
/// Built by [`crate::chunk::chunk_source`] or [`ContentChunk::new`] and never
/// mutated afterwards. The `fingerprint` is the SHA-256 of `text`; together
/// with `source` it is the deduplication key for re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentChunk {
    /// Chunk UUID. Replaced by the stored id when an identical chunk exists.
    pub id: String,
    /// File path or URL the text came from.
    pub source: String,
    /// Position of this chunk within its source, starting at 0.
    pub index: i64,
    pub text: String,
    /// Hex-encoded SHA-256 of `text`.
    pub fingerprint: String,
    /// Estimated model tokens, see [`crate::chunk::estimate_tokens`].
    pub token_estimate: usize,
}

/// A chunk paired with its relevance to one query.
///
/// `score` is always within `[0.0, 1.0]`. Produced per query, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: ContentChunk,
    pub score: f32,
}

/// One finished research run remembered by the recency store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub query: String,
    pub report: String,
    pub created_at: DateTime<Utc>,
}

/// A page of memory entries, newest first, plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryPage {
    pub entries: Vec<MemoryEntry>,
    pub total: usize,
}
