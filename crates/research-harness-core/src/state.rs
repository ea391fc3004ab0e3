//! Typed research state threaded through the pipeline.
//!
//! [`ResearchState`] has one optional [`StageOutput`] slot per [`StageId`].
//! A slot is `None` until its stage has run; a stage that failed still fills
//! its slot, with the stage's placeholder text and `degraded = true`.
//!
//! The query and the debug flag are fixed at construction and have no
//! setters.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Map, Value};

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Search,
    ContextAnalysis,
    Retrieval,
    ToolAggregation,
    Synthesis,
    ReportGeneration,
}

impl StageId {
    /// Every stage in execution order.
    pub const ORDER: [StageId; 6] = [
        StageId::Search,
        StageId::ContextAnalysis,
        StageId::Retrieval,
        StageId::ToolAggregation,
        StageId::Synthesis,
        StageId::ReportGeneration,
    ];

    /// The stages that run concurrently before Synthesis.
    pub const GATHER: [StageId; 4] = [
        StageId::Search,
        StageId::ContextAnalysis,
        StageId::Retrieval,
        StageId::ToolAggregation,
    ];

    /// Machine name, used for prompt file stems and JSON keys.
    pub fn name(self) -> &'static str {
        match self {
            StageId::Search => "search",
            StageId::ContextAnalysis => "context_analysis",
            StageId::Retrieval => "retrieval",
            StageId::ToolAggregation => "tool_aggregation",
            StageId::Synthesis => "synthesis",
            StageId::ReportGeneration => "report_generation",
        }
    }

    /// Display label, used in logs and placeholder text.
    pub fn label(self) -> &'static str {
        match self {
            StageId::Search => "Search",
            StageId::ContextAnalysis => "Context-Analysis",
            StageId::Retrieval => "Retrieval",
            StageId::ToolAggregation => "Tool-Aggregation",
            StageId::Synthesis => "Synthesis",
            StageId::ReportGeneration => "Report-Generation",
        }
    }

    /// Deterministic output substituted when the stage fails.
    pub fn failure_placeholder(self) -> String {
        format!("{} failed", self.label())
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stage '{}'", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl FromStr for StageId {
    type Err = UnknownStage;

    /// Accepts the machine name or the label, case-insensitively, with `-`
    /// and `_` interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        StageId::ORDER
            .into_iter()
            .find(|id| id.name() == norm)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Per-stage debug capture. Only built when the run was started with
/// `debug = true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugRecord {
    pub stage: StageId,
    pub input: String,
    pub prompt: String,
    pub output: String,
    /// Stage-specific extras (e.g. retrieval timings and fallback reason).
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl DebugRecord {
    pub fn new(stage: StageId, input: impl Into<String>) -> Self {
        Self {
            stage,
            input: input.into(),
            prompt: String::new(),
            output: String::new(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// The result of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutput {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugRecord>,
    /// True when `output` is the failure placeholder.
    pub degraded: bool,
}

impl StageOutput {
    pub fn completed(output: impl Into<String>, debug: Option<DebugRecord>) -> Self {
        Self {
            output: output.into(),
            debug,
            degraded: false,
        }
    }

    /// The placeholder output for a failed stage. When debug capture is on,
    /// `reason` is recorded in the debug record's extras.
    pub fn degraded(stage: StageId, reason: &str, debug: Option<DebugRecord>) -> Self {
        let output = stage.failure_placeholder();
        let debug = debug.map(|mut d| {
            d.output = output.clone();
            d.extra.insert("error".to_string(), Value::String(reason.to_string()));
            d
        });
        Self {
            output,
            debug,
            degraded: true,
        }
    }
}

/// State of one research run.
#[derive(Debug, Clone)]
pub struct ResearchState {
    query: String,
    debug: bool,
    search: Option<StageOutput>,
    context_analysis: Option<StageOutput>,
    retrieval: Option<StageOutput>,
    tool_aggregation: Option<StageOutput>,
    synthesis: Option<StageOutput>,
    report_generation: Option<StageOutput>,
}

impl ResearchState {
    pub fn new(query: impl Into<String>, debug: bool) -> Self {
        Self {
            query: query.into(),
            debug,
            search: None,
            context_analysis: None,
            retrieval: None,
            tool_aggregation: None,
            synthesis: None,
            report_generation: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    fn slot_mut(&mut self, stage: StageId) -> &mut Option<StageOutput> {
        match stage {
            StageId::Search => &mut self.search,
            StageId::ContextAnalysis => &mut self.context_analysis,
            StageId::Retrieval => &mut self.retrieval,
            StageId::ToolAggregation => &mut self.tool_aggregation,
            StageId::Synthesis => &mut self.synthesis,
            StageId::ReportGeneration => &mut self.report_generation,
        }
    }

    /// Store `out` in the slot owned by `stage`. No other slot is touched.
    pub fn record(&mut self, stage: StageId, out: StageOutput) {
        *self.slot_mut(stage) = Some(out);
    }

    pub fn output(&self, stage: StageId) -> Option<&StageOutput> {
        match stage {
            StageId::Search => self.search.as_ref(),
            StageId::ContextAnalysis => self.context_analysis.as_ref(),
            StageId::Retrieval => self.retrieval.as_ref(),
            StageId::ToolAggregation => self.tool_aggregation.as_ref(),
            StageId::Synthesis => self.synthesis.as_ref(),
            StageId::ReportGeneration => self.report_generation.as_ref(),
        }
    }

    /// The Report-Generation output, or its placeholder when that stage did
    /// not produce anything. Never empty.
    pub fn final_report(&self) -> String {
        match &self.report_generation {
            Some(out) if !out.output.trim().is_empty() => out.output.clone(),
            _ => StageId::ReportGeneration.failure_placeholder(),
        }
    }

    /// Stages that did not complete successfully (degraded or never ran).
    pub fn degraded_stages(&self) -> Vec<StageId> {
        StageId::ORDER
            .into_iter()
            .filter(|id| self.output(*id).map_or(true, |o| o.degraded))
            .collect()
    }

    /// Debug records in stage order.
    pub fn debug_records(&self) -> Vec<&DebugRecord> {
        StageId::ORDER
            .into_iter()
            .filter_map(|id| self.output(id).and_then(|o| o.debug.as_ref()))
            .collect()
    }

    /// JSON snapshot: `query`, `<stage>_output` for every stage that ran,
    /// `<stage>_debug` when captured, and `final_report`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("query".to_string(), json!(self.query));
        obj.insert("debug".to_string(), json!(self.debug));

        for id in StageId::ORDER {
            if let Some(out) = self.output(id) {
                obj.insert(format!("{}_output", id.name()), json!(out.output));
                if let Some(d) = &out.debug {
                    obj.insert(format!("{}_debug", id.name()), json!(d));
                }
            }
        }

        let degraded: Vec<&str> = self.degraded_stages().into_iter().map(StageId::name).collect();
        obj.insert("degraded_stages".to_string(), json!(degraded));
        obj.insert("final_report".to_string(), json!(self.final_report()));
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_parse_back() {
        for id in StageId::ORDER {
            assert_eq!(id.name().parse::<StageId>().unwrap(), id);
            assert_eq!(id.label().parse::<StageId>().unwrap(), id);
        }
        assert!("summarize".parse::<StageId>().is_err());
    }

    #[test]
    fn placeholder_uses_label() {
        assert_eq!(StageId::Search.failure_placeholder(), "Search failed");
        assert_eq!(
            StageId::ReportGeneration.failure_placeholder(),
            "Report-Generation failed"
        );
    }

    #[test]
    fn empty_state_still_has_a_report() {
        let state = ResearchState::new("q", false);
        assert_eq!(state.final_report(), "Report-Generation failed");
        assert_eq!(state.degraded_stages().len(), 6);
    }

    #[test]
    fn record_writes_only_its_slot() {
        let mut state = ResearchState::new("q", false);
        state.record(StageId::Retrieval, StageOutput::completed("ctx", None));

        for id in StageId::ORDER {
            if id == StageId::Retrieval {
                assert_eq!(state.output(id).unwrap().output, "ctx");
            } else {
                assert!(state.output(id).is_none());
            }
        }
    }

    #[test]
    fn degraded_output_records_reason_in_debug() {
        let out = StageOutput::degraded(
            StageId::Synthesis,
            "timeout",
            Some(DebugRecord::new(StageId::Synthesis, "in")),
        );
        assert!(out.degraded);
        assert_eq!(out.output, "Synthesis failed");
        let d = out.debug.unwrap();
        assert_eq!(d.output, "Synthesis failed");
        assert_eq!(d.extra["error"], "timeout");
    }

    #[test]
    fn json_snapshot_contains_outputs_and_report() {
        let mut state = ResearchState::new("what is rust", true);
        state.record(
            StageId::Search,
            StageOutput::completed("summary", Some(DebugRecord::new(StageId::Search, "what is rust"))),
        );
        state.record(StageId::ReportGeneration, StageOutput::completed("the report", None));

        let v = state.to_json();
        assert_eq!(v["query"], "what is rust");
        assert_eq!(v["search_output"], "summary");
        assert_eq!(v["search_debug"]["stage"], "search");
        assert_eq!(v["final_report"], "the report");
        assert!(v.get("synthesis_output").is_none());
    }
}
