//! Relevance scoring, threshold search, and token-budgeted context assembly.
//!
//! These are the storage- and runtime-agnostic halves of the retrieval
//! engine. The application's `RetrievalEngine` embeds the query, then calls
//! into this module with a [`ChunkStore`].
//!
//! # Scoring
//!
//! Relevance is cosine similarity clamped to `[0.0, 1.0]`. Negative
//! similarity means "unrelated" and scores `0.0`; a NaN (degenerate vector)
//! also scores `0.0`.
//!
//! # Assembly
//!
//! Results are rendered as blocks of the form
//!
//! ```text
//! Source: <source>
//! <text>
//! ---
//! ```
//!
//! and accumulated greedily in descending relevance. Assembly stops at the
//! first block that would overflow the budget, so the output is always a
//! prefix of the ranked list.

use anyhow::Result;
use serde::Serialize;

use crate::chunk::estimate_tokens;
use crate::models::RetrievalResult;
use crate::store::ChunkStore;

/// Map a raw cosine similarity to a relevance score in `[0.0, 1.0]`.
pub fn relevance(raw: f32) -> f32 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

/// Top-`k` stored chunks by relevance, keeping only scores `>= threshold`.
///
/// Filtering happens after the top-`k` cut, so raising the threshold can only
/// remove results, never introduce new ones.
pub async fn similarity_search(
    store: &dyn ChunkStore,
    query_vec: &[f32],
    k: usize,
    threshold: f32,
) -> Result<Vec<RetrievalResult>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let candidates = store.vector_search(query_vec, k).await?;
    Ok(candidates
        .into_iter()
        .map(|c| RetrievalResult {
            score: relevance(c.raw_score),
            chunk: c.chunk,
        })
        .filter(|r| r.score >= threshold)
        .collect())
}

/// Render one result as a context block.
pub fn format_block(result: &RetrievalResult) -> String {
    format!("Source: {}\n{}\n---\n", result.chunk.source, result.chunk.text)
}

/// A token-budgeted context blob and what went into it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Number of blocks included.
    pub chunks_used: usize,
    /// Sum of per-block token estimates; never above the budget.
    pub tokens: usize,
    /// Distinct sources in inclusion order.
    pub sources: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Greedily concatenate blocks from `results` (already sorted by relevance)
/// until the next block would exceed `token_budget`.
pub fn assemble_context(results: &[RetrievalResult], token_budget: usize) -> AssembledContext {
    let mut out = AssembledContext::default();

    for result in results {
        let block = format_block(result);
        let cost = estimate_tokens(&block);
        if out.tokens + cost > token_budget {
            break;
        }
        out.text.push_str(&block);
        out.tokens += cost;
        out.chunks_used += 1;
        if !out.sources.contains(&result.chunk.source) {
            out.sources.push(result.chunk.source.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentChunk;
    use crate::store::memory::InMemoryChunkStore;

    fn result(source: &str, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: ContentChunk::new(source, 0, text),
            score,
        }
    }

    #[test]
    fn relevance_is_clamped() {
        assert_eq!(relevance(-0.4), 0.0);
        assert_eq!(relevance(0.5), 0.5);
        assert_eq!(relevance(1.0000001), 1.0);
        assert_eq!(relevance(f32::NAN), 0.0);
    }

    #[test]
    fn block_format_is_stable() {
        let r = result("doc1.txt", "hello", 0.9);
        assert_eq!(format_block(&r), "Source: doc1.txt\nhello\n---\n");
    }

    #[test]
    fn assembly_stops_at_first_overflow() {
        let results = vec![
            result("a", &"x".repeat(40), 0.9),
            result("b", &"y".repeat(400), 0.8),
            result("c", "tiny", 0.7),
        ];
        let ctx = assemble_context(&results, 30);
        assert_eq!(ctx.chunks_used, 1);
        assert_eq!(ctx.sources, vec!["a"]);
        assert!(!ctx.text.contains("tiny"));
    }

    #[test]
    fn assembly_never_exceeds_budget() {
        let results: Vec<_> = (0..50)
            .map(|i| result(&format!("s{}", i), &"word ".repeat(i + 1), 1.0 - i as f32 / 100.0))
            .collect();
        for budget in [0, 1, 5, 17, 64, 200, 4000] {
            let ctx = assemble_context(&results, budget);
            assert!(ctx.tokens <= budget);
            assert!(estimate_tokens(&ctx.text) <= budget);
        }
    }

    #[test]
    fn zero_budget_or_no_results_is_empty() {
        assert!(assemble_context(&[], 4000).is_empty());
        assert!(assemble_context(&[result("a", "text", 1.0)], 0).is_empty());
    }

    #[tokio::test]
    async fn higher_threshold_yields_subset() {
        let store = InMemoryChunkStore::new();
        store
            .insert_batch(&[
                (ContentChunk::new("a", 0, "a"), vec![1.0, 0.0]),
                (ContentChunk::new("b", 0, "b"), vec![0.8, 0.6]),
                (ContentChunk::new("c", 0, "c"), vec![0.0, 1.0]),
                (ContentChunk::new("d", 0, "d"), vec![-1.0, 0.0]),
            ])
            .await
            .unwrap();

        let q = [1.0, 0.0];
        let loose = similarity_search(&store, &q, 4, 0.0).await.unwrap();
        let strict = similarity_search(&store, &q, 4, 0.9).await.unwrap();

        assert_eq!(loose.len(), 4);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].chunk.source, "a");
        for r in &strict {
            assert!(loose.iter().any(|l| l.chunk.id == r.chunk.id));
        }
        assert!(loose.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(loose.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }
}
