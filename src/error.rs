//! Typed error taxonomy.
//!
//! Plumbing uses `anyhow::Result`; these types exist where a caller needs to
//! match on the kind of failure (rejecting a query, reporting a failed
//! source, degrading a stage).

use thiserror::Error;

use research_harness_core::state::StageId;

/// A query rejected before any stage ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("query is {len} characters, the maximum is {max}")]
    QueryTooLong { len: usize, max: usize },
}

/// Validate a research query: non-empty after trimming and at most `max`
/// characters. Over-long queries are rejected, never truncated.
pub fn validate_query(query: &str, max: usize) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let len = query.chars().count();
    if len > max {
        return Err(ValidationError::QueryTooLong { len, max });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{component} is not configured: {message}")]
    Configuration { component: String, message: String },

    #[error("failed to ingest {origin}: {reason}")]
    Ingestion { origin: String, reason: String },

    #[error("{stage} stage failed: {message}")]
    Stage { stage: StageId, message: String },
}

impl ResearchError {
    pub fn configuration(component: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.to_string(),
            message: message.into(),
        }
    }

    pub fn stage(stage: StageId, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }
}
