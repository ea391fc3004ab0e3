//! Durable [`RecencyStore`] over the `memory_entries` table.
//!
//! Timestamps are stored as UTC milliseconds. Ordering falls back to
//! `rowid` so entries written within the same millisecond still list in
//! insertion order.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use research_harness_core::models::{MemoryEntry, MemoryPage};
use research_harness_core::recency::RecencyStore;

pub struct SqliteRecencyStore {
    pool: SqlitePool,
}

impl SqliteRecencyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &SqliteRow) -> MemoryEntry {
    let millis: i64 = row.get("created_at");
    MemoryEntry {
        id: row.get("id"),
        query: row.get("query"),
        report: row.get("report"),
        created_at: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
    }
}

#[async_trait]
impl RecencyStore for SqliteRecencyStore {
    async fn store(&self, query: &str, report: &str) -> Result<MemoryEntry> {
        let entry = MemoryEntry::new(query, report);
        sqlx::query("INSERT INTO memory_entries (id, query, report, created_at) VALUES (?, ?, ?, ?)")
            .bind(&entry.id)
            .bind(&entry.query)
            .bind(&entry.report)
            .bind(entry.created_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(entry)
    }

    async fn list(&self) -> Result<Vec<MemoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, query, report, created_at FROM memory_entries ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_entry).collect())
    }

    async fn list_page(&self, limit: usize, offset: usize) -> Result<MemoryPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memory_entries")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, query, report, created_at FROM memory_entries
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(MemoryPage {
            entries: rows.iter().map(row_to_entry).collect(),
            total: total as usize,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        let row = sqlx::query("SELECT id, query, report, created_at FROM memory_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_entry))
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM memory_entries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
