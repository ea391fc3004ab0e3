use anyhow::Result;
use std::sync::Arc;

use research_harness_core::state::{DebugRecord, StageId, StageOutput};

use crate::error::ResearchError;
use crate::prompt::Sections;
use crate::tools::ToolRegistry;

use super::PromptStage;

/// Returned without an LLM call when no tools are registered.
pub const NO_TOOLS: &str = "No external sources configured.";

/// Queries every registered tool and has the model merge their results
/// into one reference list.
pub struct ToolAggregationStage {
    prompt: PromptStage,
    tools: Arc<ToolRegistry>,
}

impl ToolAggregationStage {
    pub fn new(prompt: PromptStage, tools: Arc<ToolRegistry>) -> Self {
        Self { prompt, tools }
    }

    pub async fn run(&self, query: &str, debug: bool) -> Result<StageOutput> {
        if self.tools.is_empty() {
            let record = debug.then(|| {
                let mut d = DebugRecord::new(StageId::ToolAggregation, query).with_extra("tools", 0);
                d.output = NO_TOOLS.to_string();
                d
            });
            return Ok(StageOutput::completed(NO_TOOLS, record));
        }

        let outcomes = self.tools.lookup_all(query).await;
        if outcomes.iter().all(|o| o.result.is_err()) {
            return Err(ResearchError::stage(StageId::ToolAggregation, "every external tool failed").into());
        }

        let sources = outcomes
            .iter()
            .fold(Sections::new(), |s, o| match &o.result {
                Ok(text) => s.push(&o.tool, text),
                Err(e) => s.push(&o.tool, &format!("Error: {}", e)),
            })
            .render();

        let mut out = self
            .prompt
            .execute(&sources, &[("query", query), ("sources", &sources)], debug)
            .await?;
        if let Some(d) = out.debug.as_mut() {
            d.extra.insert("tools".to_string(), outcomes.len().into());
        }
        Ok(out)
    }
}
