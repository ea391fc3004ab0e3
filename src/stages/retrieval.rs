//! Retrieval stage: answers the query from the retrieval engine's context,
//! or from general knowledge when no usable context exists.
//!
//! A fallback answer is labeled `[Fallback Response - <reason>]` and the
//! reason is recorded, so callers can tell "nothing stored" from "nothing
//! relevant" from "retrieval broke".

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use research_harness_core::retrieval::AssembledContext;
use research_harness_core::state::{DebugRecord, StageId, StageOutput};

use crate::llm::LlmClient;
use crate::prompt::PromptTemplate;
use crate::retrieval::RetrievalEngine;

use super::complete_cleaned;

/// Characters of assembled context kept in the debug record.
const DEBUG_CONTEXT_CHARS: usize = 1000;

/// Returned by [`RetrievalStage::answer`] when neither the context answer
/// nor the general-knowledge fallback could be generated.
pub const UNABLE_TO_ANSWER: &str = "I apologize, but I'm unable to provide a response at this time.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum FallbackReason {
    /// The engine holds no chunks.
    NoDocuments,
    /// Chunks exist but none passed the relevance threshold.
    NoRelevantMatch,
    /// Retrieval is turned off in configuration.
    Disabled,
    /// Embedding or storage failed.
    RetrievalError(String),
    /// Context was found but the model failed to answer from it.
    GenerationError(String),
}

impl FallbackReason {
    pub fn label(&self) -> String {
        match self {
            Self::NoDocuments => "No documents ingested".to_string(),
            Self::NoRelevantMatch => "No relevant documents found".to_string(),
            Self::Disabled => "Retrieval disabled".to_string(),
            Self::RetrievalError(e) | Self::GenerationError(e) => format!("Error: {}", e),
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoDocuments => "no_documents",
            Self::NoRelevantMatch => "no_relevant_match",
            Self::Disabled => "disabled",
            Self::RetrievalError(_) => "retrieval_error",
            Self::GenerationError(_) => "generation_error",
        };
        f.write_str(name)
    }
}

/// A retrieval-backed answer.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub output: String,
    pub context_used: bool,
    /// Characters of assembled context given to the model.
    pub context_length: usize,
    pub fallback: Option<FallbackReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugRecord>,
}

/// The fallback completion failed too.
struct Unanswered {
    reason: FallbackReason,
    error: anyhow::Error,
    total_chunks: usize,
}

pub struct RetrievalStage {
    engine: Option<Arc<RetrievalEngine>>,
    template: PromptTemplate,
    fallback_template: PromptTemplate,
    llm: Arc<dyn LlmClient>,
    default_budget: usize,
}

impl RetrievalStage {
    pub fn new(
        engine: Option<Arc<RetrievalEngine>>,
        template: PromptTemplate,
        fallback_template: PromptTemplate,
        llm: Arc<dyn LlmClient>,
        default_budget: usize,
    ) -> Self {
        Self {
            engine,
            template,
            fallback_template,
            llm,
            default_budget,
        }
    }

    /// Pipeline entry point. Fails when no answer at all could be generated,
    /// so the orchestrator degrades the stage.
    pub async fn run(&self, query: &str, debug: bool) -> Result<StageOutput> {
        let answer = self
            .try_answer(query, self.default_budget, debug)
            .await
            .map_err(|u| u.error)?;
        Ok(StageOutput::completed(answer.output, answer.debug))
    }

    /// Answer `query` with at most `max_tokens` of assembled context.
    ///
    /// Always returns an answer: if the fallback completion fails as well,
    /// the output is [`UNABLE_TO_ANSWER`] and the failure is recorded in
    /// `fallback` and the debug record.
    pub async fn answer(&self, query: &str, max_tokens: usize, debug: bool) -> RagAnswer {
        let started = Instant::now();
        match self.try_answer(query, max_tokens, debug).await {
            Ok(answer) => answer,
            Err(Unanswered {
                reason,
                error,
                total_chunks,
            }) => {
                let error = format!("{:#}", error);
                warn!(reason = %reason, error = %error, "retrieval answer unavailable");
                let record = debug.then(|| {
                    build_record(query, "", UNABLE_TO_ANSWER, None, total_chunks, Some(&reason), started)
                        .with_extra("error", error)
                });
                RagAnswer {
                    output: UNABLE_TO_ANSWER.to_string(),
                    context_used: false,
                    context_length: 0,
                    fallback: Some(reason),
                    debug: record,
                }
            }
        }
    }

    async fn try_answer(&self, query: &str, max_tokens: usize, debug: bool) -> Result<RagAnswer, Unanswered> {
        let started = Instant::now();

        let (gathered, total_chunks) = match &self.engine {
            None => (Err(FallbackReason::Disabled), 0),
            Some(engine) => gather_context(engine, query, max_tokens).await,
        };

        let reason = match gathered {
            Ok(ctx) => {
                let attempt = complete_cleaned(
                    StageId::Retrieval,
                    &self.template,
                    self.llm.as_ref(),
                    &[("query", query), ("context", &ctx.text)],
                )
                .await;
                match attempt {
                    Ok((prompt, output)) => {
                        let record = debug.then(|| {
                            build_record(query, &prompt, &output, Some(&ctx), total_chunks, None, started)
                        });
                        return Ok(RagAnswer {
                            output,
                            context_used: true,
                            context_length: ctx.text.chars().count(),
                            fallback: None,
                            debug: record,
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "answer from context failed, using fallback");
                        FallbackReason::GenerationError(format!("{:#}", e))
                    }
                }
            }
            Err(reason) => reason,
        };

        let attempt = complete_cleaned(
            StageId::Retrieval,
            &self.fallback_template,
            self.llm.as_ref(),
            &[("query", query)],
        )
        .await;
        match attempt {
            Ok((prompt, output)) => {
                let labeled = format!("[Fallback Response - {}]\n\n{}", reason.label(), output);
                let record = debug.then(|| {
                    build_record(query, &prompt, &labeled, None, total_chunks, Some(&reason), started)
                });
                Ok(RagAnswer {
                    output: labeled,
                    context_used: false,
                    context_length: 0,
                    fallback: Some(reason),
                    debug: record,
                })
            }
            Err(error) => Err(Unanswered {
                reason,
                error,
                total_chunks,
            }),
        }
    }
}

fn build_record(
    query: &str,
    prompt: &str,
    output: &str,
    context: Option<&AssembledContext>,
    total_chunks: usize,
    fallback: Option<&FallbackReason>,
    started: Instant,
) -> DebugRecord {
    let context_text = context.map_or("", |c| c.text.as_str());
    let mut d = DebugRecord::new(StageId::Retrieval, query)
        .with_extra("context", truncate(context_text, DEBUG_CONTEXT_CHARS))
        .with_extra("context_used", context.is_some())
        .with_extra("context_length", context_text.chars().count())
        .with_extra("chunks_used", context.map_or(0, |c| c.chunks_used))
        .with_extra("total_chunks", total_chunks)
        .with_extra("elapsed_ms", started.elapsed().as_millis() as u64);
    if let Some(reason) = fallback {
        d = d.with_extra("fallback_reason", Value::String(reason.to_string()));
    }
    d.prompt = prompt.to_string();
    d.output = output.to_string();
    d
}

/// The non-empty context for `query`, or why there is none, plus the
/// store size.
async fn gather_context(
    engine: &RetrievalEngine,
    query: &str,
    max_tokens: usize,
) -> (Result<AssembledContext, FallbackReason>, usize) {
    let total = match engine.count().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "retrieval store unavailable");
            return (Err(FallbackReason::RetrievalError(e.to_string())), 0);
        }
    };
    if total == 0 {
        let reason = FallbackReason::NoDocuments;
        warn!(reason = %reason, "no documents in retrieval store");
        return (Err(reason), 0);
    }

    match engine.assemble(query, max_tokens).await {
        Ok(ctx) if ctx.is_empty() => {
            let reason = FallbackReason::NoRelevantMatch;
            warn!(reason = %reason, total_chunks = total, "no relevant context found");
            (Err(reason), total)
        }
        Ok(ctx) => (Ok(ctx), total),
        Err(e) => {
            warn!(error = %e, "context assembly failed");
            (Err(FallbackReason::RetrievalError(e.to_string())), total)
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_labels() {
        assert_eq!(FallbackReason::NoDocuments.label(), "No documents ingested");
        assert_eq!(FallbackReason::NoRelevantMatch.label(), "No relevant documents found");
        assert_eq!(
            FallbackReason::RetrievalError("disk full".into()).label(),
            "Error: disk full"
        );
        assert_eq!(
            FallbackReason::GenerationError("rate limited".into()).label(),
            "Error: rate limited"
        );
        assert_eq!(FallbackReason::NoDocuments.to_string(), "no_documents");
        assert_eq!(FallbackReason::NoRelevantMatch.to_string(), "no_relevant_match");
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("ééé", 2), "éé");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
