//! Retrieval-engine and memory statistics for `rsh stats`.

use anyhow::Result;

use crate::harness::Harness;

pub async fn run_stats(harness: &Harness, json: bool) -> Result<()> {
    let stats = harness.engine.stats().await?;
    let memory_total = harness.recency.list_page(0, 0).await?.total;

    if json {
        let mut value = serde_json::to_value(&stats)?;
        value["memory_entries"] = memory_total.into();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&harness.config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Research Harness — Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", stats.persist_location);
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", stats.collection);
    println!("  Embedding:   {}", stats.embedding_model);
    println!();
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Memory:      {} entries", memory_total);

    if !stats.sample_sources.is_empty() {
        println!();
        println!("  Sources:");
        for source in &stats.sample_sources {
            println!("    {}", source);
        }
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
