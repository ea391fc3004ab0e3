use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Every statement is idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Chunks with their embedding vectors
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            token_estimate INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(source, fingerprint)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;

    // Recency store
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS memory_entries (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            report TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_memory_created ON memory_entries(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
