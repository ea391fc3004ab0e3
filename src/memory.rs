//! `rsh memory list|get|clear`.

use anyhow::{bail, Result};

use crate::harness::Harness;

pub async fn run_memory_list(harness: &Harness, limit: usize, offset: usize, json: bool) -> Result<()> {
    let page = harness.recency.list_page(limit, offset).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.entries.is_empty() {
        println!("No memory entries.");
        return Ok(());
    }
    for entry in &page.entries {
        println!(
            "{}  {}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.query
        );
    }
    println!();
    println!(
        "Showing {}-{} of {}",
        offset + 1,
        offset + page.entries.len(),
        page.total
    );
    Ok(())
}

pub async fn run_memory_get(harness: &Harness, id: &str, json: bool) -> Result<()> {
    let Some(entry) = harness.recency.get(id).await? else {
        bail!("No memory entry with id {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("id:      {}", entry.id);
        println!("created: {}", entry.created_at.to_rfc3339());
        println!("query:   {}", entry.query);
        println!();
        println!("{}", entry.report);
    }
    Ok(())
}

pub async fn run_memory_clear(harness: &Harness) -> Result<()> {
    let removed = harness.recency.clear().await?;
    println!("Cleared {} memory entries.", removed);
    Ok(())
}
