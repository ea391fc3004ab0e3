use anyhow::Result;

use research_harness_core::state::StageOutput;

use super::PromptStage;

/// Summarizes what is known about the query.
pub struct SearchStage {
    prompt: PromptStage,
}

impl SearchStage {
    pub fn new(prompt: PromptStage) -> Self {
        Self { prompt }
    }

    pub async fn run(&self, query: &str, debug: bool) -> Result<StageOutput> {
        self.prompt.execute(query, &[("query", query)], debug).await
    }
}
