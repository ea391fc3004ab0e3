//! Stage executors.
//!
//! Every stage renders its prompt, calls the LLM through the pooled
//! adapter, and strips reasoning markup from the completion. Failures are
//! not handled inside the stages: the orchestrator wraps each one in
//! [`isolate`], which turns an error or a timeout into the stage's
//! placeholder output.

pub mod context;
pub mod retrieval;
pub mod search;
pub mod synthesis;
pub mod tools;

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use research_harness_core::state::{DebugRecord, StageId, StageOutput};

use crate::error::ResearchError;
use crate::llm::LlmClient;
use crate::prompt::{strip_reasoning, PromptTemplate};

/// Run one stage with a time limit, degrading to the placeholder on error
/// or timeout. `debug` is the record to attach if the stage fails; pass
/// `None` when debug capture is off.
pub async fn isolate<F>(
    stage: StageId,
    debug: Option<DebugRecord>,
    limit: Duration,
    fut: F,
) -> StageOutput
where
    F: Future<Output = Result<StageOutput>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(out)) => {
            info!(stage = %stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage completed");
            out
        }
        Ok(Err(e)) => {
            let reason = format!("{:#}", e);
            warn!(stage = %stage, error = %reason, "stage degraded");
            StageOutput::degraded(stage, &reason, debug)
        }
        Err(_) => {
            let reason = format!("timed out after {}ms", limit.as_millis());
            warn!(stage = %stage, error = %reason, "stage degraded");
            StageOutput::degraded(stage, &reason, debug)
        }
    }
}

/// A stage that renders one template and makes one LLM call.
pub struct PromptStage {
    id: StageId,
    template: PromptTemplate,
    llm: Arc<dyn LlmClient>,
}

impl PromptStage {
    pub fn new(id: StageId, template: PromptTemplate, llm: Arc<dyn LlmClient>) -> Self {
        Self { id, template, llm }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    /// Render with `vars`, complete, and clean the result. `input` is only
    /// used for the debug record.
    pub async fn execute(&self, input: &str, vars: &[(&str, &str)], debug: bool) -> Result<StageOutput> {
        let (prompt, output) = complete_cleaned(self.id, &self.template, self.llm.as_ref(), vars).await?;
        let record = debug.then(|| DebugRecord {
            stage: self.id,
            input: input.to_string(),
            prompt,
            output: output.clone(),
            extra: Default::default(),
        });
        Ok(StageOutput::completed(output, record))
    }
}

/// Render `template`, call `llm`, strip reasoning. An empty cleaned
/// completion is an error. Returns `(prompt, output)`.
pub(crate) async fn complete_cleaned(
    stage: StageId,
    template: &PromptTemplate,
    llm: &dyn LlmClient,
    vars: &[(&str, &str)],
) -> Result<(String, String)> {
    let prompt = template.render(vars)?;
    debug!(stage = %stage, template = template.name(), prompt_chars = prompt.len(), "calling llm");
    let raw = llm.complete(&prompt).await?;
    let output = strip_reasoning(&raw);
    if output.is_empty() {
        return Err(ResearchError::stage(stage, "model returned an empty completion").into());
    }
    Ok((prompt, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl LlmClient for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn stage(reply: &'static str) -> PromptStage {
        let template = PromptTemplate::parse("search", "Q: {{query}}", &["query"]).unwrap();
        PromptStage::new(StageId::Search, template, Arc::new(Echo(reply)))
    }

    #[tokio::test]
    async fn execute_strips_reasoning_and_records_debug() {
        let out = stage("<think>plan</think>Answer")
            .execute("rust", &[("query", "rust")], true)
            .await
            .unwrap();
        assert_eq!(out.output, "Answer");
        let d = out.debug.unwrap();
        assert_eq!(d.prompt, "Q: rust");
        assert_eq!(d.input, "rust");
        assert_eq!(d.output, "Answer");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let err = stage("<think>only thoughts</think>  ")
            .execute("q", &[("query", "q")], false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }

    #[tokio::test]
    async fn isolate_degrades_errors_and_timeouts() {
        let failed = isolate(
            StageId::Search,
            Some(DebugRecord::new(StageId::Search, "q")),
            Duration::from_secs(1),
            async { Err(anyhow::anyhow!("boom")) },
        )
        .await;
        assert_eq!(failed.output, "Search failed");
        assert!(failed.degraded);
        assert_eq!(failed.debug.unwrap().extra["error"], "boom");

        let slow = isolate(StageId::Synthesis, None, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StageOutput::completed("late", None))
        })
        .await;
        assert_eq!(slow.output, "Synthesis failed");
        assert!(slow.debug.is_none());
    }
}
