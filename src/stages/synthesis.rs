use anyhow::Result;

use research_harness_core::state::StageOutput;

use crate::prompt::Sections;

use super::PromptStage;

/// Outputs of the four gather stages. Only built once all four have
/// finished, so Synthesis cannot see a missing field.
#[derive(Debug, Clone, Copy)]
pub struct Gathered<'a> {
    pub search: &'a str,
    pub history: &'a str,
    pub retrieved: &'a str,
    pub external: &'a str,
}

impl Gathered<'_> {
    /// The composite input, always in the same section order.
    pub fn compose(&self) -> String {
        Sections::new()
            .push("Search Summary", self.search)
            .push("Historical Context", self.history)
            .push("Retrieved Context", self.retrieved)
            .push("External Sources", self.external)
            .render()
    }
}

pub struct SynthesisStage {
    prompt: PromptStage,
}

impl SynthesisStage {
    pub fn new(prompt: PromptStage) -> Self {
        Self { prompt }
    }

    pub async fn run(&self, query: &str, gathered: &Gathered<'_>, debug: bool) -> Result<StageOutput> {
        let input = gathered.compose();
        self.prompt
            .execute(&input, &[("query", query), ("input", &input)], debug)
            .await
    }
}

pub struct ReportStage {
    prompt: PromptStage,
}

impl ReportStage {
    pub fn new(prompt: PromptStage) -> Self {
        Self { prompt }
    }

    /// `insights` is the Synthesis output, `sources` the Tool-Aggregation
    /// output.
    pub async fn run(&self, query: &str, insights: &str, sources: &str, debug: bool) -> Result<StageOutput> {
        let input = Sections::new()
            .push("Insights", insights)
            .push("Referenced Sources", sources)
            .render();
        self.prompt
            .execute(&input, &[("query", query), ("input", &input)], debug)
            .await
    }
}
