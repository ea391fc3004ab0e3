//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Chunks and their embedding BLOBs live in one `chunks` table, keyed for
//! deduplication by `UNIQUE(source, fingerprint)`. Each batch insert runs in
//! a single transaction, so WAL readers see all of a batch or none of it.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use research_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use research_harness_core::models::ContentChunk;
use research_harness_core::store::{sort_candidates, ChunkCandidate, ChunkStore};

pub struct SqliteChunkStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool, path: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            path: path.into(),
        }
    }
}

fn row_to_chunk(row: &SqliteRow) -> ContentChunk {
    let token_estimate: i64 = row.get("token_estimate");
    ContentChunk {
        id: row.get("id"),
        source: row.get("source"),
        index: row.get("chunk_index"),
        text: row.get("text"),
        fingerprint: row.get("fingerprint"),
        token_estimate: token_estimate.max(0) as usize,
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn find_existing(&self, source: &str, fingerprint: &str) -> Result<Option<String>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM chunks WHERE source = ? AND fingerprint = ?")
                .bind(source)
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    async fn insert_batch(&self, batch: &[(ContentChunk, Vec<f32>)]) -> Result<Vec<String>> {
        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(batch.len());
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in batch {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT id FROM chunks WHERE source = ? AND fingerprint = ?")
                    .bind(&chunk.source)
                    .bind(&chunk.fingerprint)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some(id) = existing {
                ids.push(id);
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, chunk_index, text, fingerprint,
                                    token_estimate, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(&chunk.fingerprint)
            .bind(chunk.token_estimate as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            ids.push(chunk.id.clone());
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, fingerprint, token_estimate, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkCandidate {
                    raw_score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                    chunk: row_to_chunk(row),
                }
            })
            .collect();

        sort_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn sample_sources(&self, limit: usize) -> Result<Vec<String>> {
        let sources: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT source FROM chunks ORDER BY source LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        Ok(sources)
    }

    async fn delete_source(&self, source: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;

    async fn store(dir: &tempfile::TempDir) -> SqliteChunkStore {
        let path = dir.path().join("chunks.sqlite");
        let pool = db::connect_path(&path).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteChunkStore::new(pool, path)
    }

    #[tokio::test]
    async fn reinsert_returns_existing_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(&dir).await;

        let first = ContentChunk::new("doc1.txt", 0, "Artificial intelligence improves diagnosis.");
        let ids = store.insert_batch(&[(first.clone(), vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(ids, vec![first.id.clone()]);

        let again = ContentChunk::new("doc1.txt", 0, "Artificial intelligence improves diagnosis.");
        let ids = store.insert_batch(&[(again, vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(ids, vec![first.id.clone()]);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.find_existing("doc1.txt", &first.fingerprint).await.unwrap(),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn search_roundtrips_chunk_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(&dir).await;

        let chunk = ContentChunk::new("notes.md", 3, "vector text");
        store.insert_batch(&[(chunk.clone(), vec![0.6, 0.8])]).await.unwrap();

        let hits = store.vector_search(&[0.6, 0.8], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk, chunk);
        assert!((hits[0].raw_score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn delete_clear_and_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(&dir).await;
        store
            .insert_batch(&[
                (ContentChunk::new("b.txt", 0, "one"), vec![1.0]),
                (ContentChunk::new("a.txt", 0, "two"), vec![1.0]),
                (ContentChunk::new("a.txt", 1, "three"), vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.sample_sources(10).await.unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(store.delete_source("a.txt").await.unwrap(), 2);
        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.location().ends_with("chunks.sqlite"));
    }
}
