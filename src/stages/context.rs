//! Context-Analysis: relates the query to recent research sessions.
//!
//! With no prior sessions the stage returns [`NO_HISTORY`] without calling
//! the model.

use anyhow::Result;
use std::sync::Arc;

use research_harness_core::models::MemoryEntry;
use research_harness_core::recency::RecencyStore;
use research_harness_core::state::{DebugRecord, StageOutput};

use super::PromptStage;

pub const NO_HISTORY: &str = "No prior research context available.";

pub struct ContextAnalysisStage {
    prompt: PromptStage,
    recency: Arc<dyn RecencyStore>,
    window: usize,
    excerpt_chars: usize,
}

impl ContextAnalysisStage {
    pub fn new(
        prompt: PromptStage,
        recency: Arc<dyn RecencyStore>,
        window: usize,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            prompt,
            recency,
            window,
            excerpt_chars,
        }
    }

    pub async fn run(&self, query: &str, debug: bool) -> Result<StageOutput> {
        let entries = self.recency.recent(self.window).await?;

        if entries.is_empty() {
            let record = debug.then(|| {
                let mut d = DebugRecord::new(self.prompt.id(), query).with_extra("history_entries", 0);
                d.output = NO_HISTORY.to_string();
                d
            });
            return Ok(StageOutput::completed(NO_HISTORY, record));
        }

        let history = format_history(&entries, self.excerpt_chars);
        let mut out = self
            .prompt
            .execute(&history, &[("query", query), ("history", &history)], debug)
            .await?;
        if let Some(d) = out.debug.as_mut() {
            d.extra.insert("history_entries".to_string(), entries.len().into());
        }
        Ok(out)
    }
}

/// Numbered history block, one entry per session, each report cut to
/// `excerpt_chars` characters with a trailing `...` when shortened.
pub fn format_history(entries: &[MemoryEntry], excerpt_chars: usize) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "{}. [{}] Query: {}\n   Findings: {}",
                i + 1,
                e.created_at.format("%Y-%m-%d %H:%M"),
                e.query,
                excerpt(&e.report, excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
