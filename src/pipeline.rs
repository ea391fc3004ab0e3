//! Pipeline orchestrator.
//!
//! ```text
//!          ┌── Search ───────────┐
//!          ├── Context-Analysis ─┤
//! query ───┼── Retrieval ────────┼──▶ Synthesis ──▶ Report-Generation
//!          └── Tool-Aggregation ─┘
//! ```
//!
//! The four gather stages run concurrently; Synthesis waits for all of them.
//! Every stage runs inside [`isolate`], so one failing stage only replaces
//! its own output with a placeholder. The whole run is bounded by a
//! deadline: stages that would start after it has passed are skipped and
//! their slots stay empty.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use research_harness_core::recency::RecencyStore;
use research_harness_core::state::{DebugRecord, ResearchState, StageId, StageOutput};

use crate::config::PipelineConfig;
use crate::error::{validate_query, ValidationError};
use crate::llm::LlmClient;
use crate::prompt::{PromptLibrary, RETRIEVAL_FALLBACK};
use crate::retrieval::RetrievalEngine;
use crate::stages::context::ContextAnalysisStage;
use crate::stages::retrieval::{RagAnswer, RetrievalStage};
use crate::stages::search::SearchStage;
use crate::stages::synthesis::{Gathered, ReportStage, SynthesisStage};
use crate::stages::tools::ToolAggregationStage;
use crate::stages::{isolate, PromptStage};
use crate::tools::ToolRegistry;

/// Limits applied to every run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_query_chars: usize,
    pub stage_timeout: Duration,
    pub deadline: Duration,
    pub history_window: usize,
    pub history_excerpt_chars: usize,
    /// Token budget for the Retrieval stage's context.
    pub context_budget: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig, context_budget: usize) -> Self {
        Self {
            max_query_chars: config.max_query_chars,
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
            deadline: Duration::from_secs(config.deadline_secs),
            history_window: config.history_window,
            history_excerpt_chars: config.history_excerpt_chars,
            context_budget,
        }
    }
}

/// Everything the pipeline depends on, passed in explicitly.
pub struct PipelineDeps {
    pub llm: Arc<dyn LlmClient>,
    pub engine: Option<Arc<RetrievalEngine>>,
    pub recency: Arc<dyn RecencyStore>,
    pub tools: Arc<ToolRegistry>,
    pub prompts: PromptLibrary,
}

pub struct ResearchPipeline {
    search: SearchStage,
    context: ContextAnalysisStage,
    retrieval: RetrievalStage,
    tools: ToolAggregationStage,
    synthesis: SynthesisStage,
    report: ReportStage,
    settings: PipelineSettings,
}

impl ResearchPipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> anyhow::Result<Self> {
        let PipelineDeps {
            llm,
            engine,
            recency,
            tools,
            prompts,
        } = deps;

        let stage = |id: StageId| -> anyhow::Result<PromptStage> {
            Ok(PromptStage::new(id, prompts.for_stage(id)?.clone(), llm.clone()))
        };

        Ok(Self {
            search: SearchStage::new(stage(StageId::Search)?),
            context: ContextAnalysisStage::new(
                stage(StageId::ContextAnalysis)?,
                recency,
                settings.history_window,
                settings.history_excerpt_chars,
            ),
            retrieval: RetrievalStage::new(
                engine,
                prompts.for_stage(StageId::Retrieval)?.clone(),
                prompts.get(RETRIEVAL_FALLBACK)?.clone(),
                llm.clone(),
                settings.context_budget,
            ),
            tools: ToolAggregationStage::new(stage(StageId::ToolAggregation)?, tools),
            synthesis: SynthesisStage::new(stage(StageId::Synthesis)?),
            report: ReportStage::new(stage(StageId::ReportGeneration)?),
            settings,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the full pipeline for `query`.
    ///
    /// Only an invalid query is an error; stage failures show up as
    /// degraded outputs in the returned state.
    pub async fn run(&self, query: &str, debug: bool) -> Result<ResearchState, ValidationError> {
        validate_query(query, self.settings.max_query_chars)?;

        let deadline = Instant::now() + self.settings.deadline;
        let mut state = ResearchState::new(query, debug);
        let capture_debug = debug;
        info!(
            query_chars = query.chars().count(),
            debug = capture_debug,
            "research started"
        );

        let (search, context, retrieval, tools) = tokio::join!(
            self.guarded(StageId::Search, query, debug, deadline, self.search.run(query, debug)),
            self.guarded(StageId::ContextAnalysis, query, debug, deadline, self.context.run(query, debug)),
            self.guarded(StageId::Retrieval, query, debug, deadline, self.retrieval.run(query, debug)),
            self.guarded(StageId::ToolAggregation, query, debug, deadline, self.tools.run(query, debug)),
        );

        for (id, out) in [
            (StageId::Search, search),
            (StageId::ContextAnalysis, context),
            (StageId::Retrieval, retrieval),
            (StageId::ToolAggregation, tools),
        ] {
            if let Some(out) = out {
                state.record(id, out);
            }
        }

        let synthesis = {
            let text = |id: StageId| {
                state
                    .output(id)
                    .map(|o| o.output.clone())
                    .unwrap_or_else(|| id.failure_placeholder())
            };
            let (s, h, r, e) = (
                text(StageId::Search),
                text(StageId::ContextAnalysis),
                text(StageId::Retrieval),
                text(StageId::ToolAggregation),
            );
            let gathered = Gathered {
                search: &s,
                history: &h,
                retrieved: &r,
                external: &e,
            };
            let input = gathered.compose();
            self.guarded(
                StageId::Synthesis,
                &input,
                debug,
                deadline,
                self.synthesis.run(query, &gathered, debug),
            )
            .await
        };
        let Some(synthesis) = synthesis else {
            return Ok(state);
        };
        let insights = synthesis.output.clone();
        state.record(StageId::Synthesis, synthesis);

        let sources = state
            .output(StageId::ToolAggregation)
            .map(|o| o.output.clone())
            .unwrap_or_else(|| StageId::ToolAggregation.failure_placeholder());
        let report = self
            .guarded(
                StageId::ReportGeneration,
                &insights,
                debug,
                deadline,
                self.report.run(query, &insights, &sources, debug),
            )
            .await;
        if let Some(report) = report {
            state.record(StageId::ReportGeneration, report);
        }

        let degraded = state.degraded_stages();
        if degraded.is_empty() {
            info!("research finished");
        } else {
            warn!(degraded = ?degraded, "research finished with degraded stages");
        }
        Ok(state)
    }

    /// Retrieval stage only: answer `query` from stored documents.
    ///
    /// Only an invalid query or a zero budget is an error; a failed
    /// completion still yields an answer, see [`RetrievalStage::answer`].
    pub async fn ask(&self, query: &str, max_tokens: usize, debug: bool) -> anyhow::Result<RagAnswer> {
        validate_query(query, self.settings.max_query_chars)?;
        if max_tokens == 0 {
            anyhow::bail!("max_tokens must be > 0");
        }
        Ok(self.retrieval.answer(query, max_tokens, debug).await)
    }

    /// Run `fut` for `stage` under the per-stage timeout, clipped to the
    /// time left before `deadline`. Returns `None` when the deadline has
    /// already passed and the stage is skipped.
    async fn guarded<F>(
        &self,
        stage: StageId,
        input: &str,
        debug: bool,
        deadline: Instant,
        fut: F,
    ) -> Option<StageOutput>
    where
        F: std::future::Future<Output = anyhow::Result<StageOutput>>,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(stage = %stage, "deadline passed, stage skipped");
            return None;
        }
        let limit = remaining.min(self.settings.stage_timeout);
        let record = debug.then(|| DebugRecord::new(stage, input));
        Some(isolate(stage, record, limit, fut).await)
    }
}
