//! External source tools consumed by the Tool-Aggregation stage.
//!
//! An [`ExternalTool`] turns a research query into a block of text
//! describing what it found (titles, links, abstracts). Concrete wrappers
//! for encyclopedias, web search, or paper indexes implement this trait and
//! are registered in a [`ToolRegistry`].
//!
//! # Usage
//!
//! ```rust
//! use research_harness::tools::ToolRegistry;
//!
//! let mut tools = ToolRegistry::new();
//! // tools.register(Box::new(MyPaperSearch::new()));
//! assert!(tools.is_empty());
//! ```

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

#[async_trait]
pub trait ExternalTool: Send + Sync {
    /// Short identifier, used as the section label in aggregated output.
    fn name(&self) -> &str;

    /// One-line description of what the tool searches.
    fn description(&self) -> &str;

    /// Look up `query`, returning a plain-text summary of the results.
    async fn lookup(&self, query: &str) -> Result<String>;
}

/// The result of one tool for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub tool: String,
    pub result: Result<String, String>,
}

/// Ordered set of external tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn ExternalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn ExternalTool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn ExternalTool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn ExternalTool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run every tool concurrently. Outcomes come back in registration
    /// order regardless of which tool finishes first; a failing tool is
    /// reported in its outcome and does not affect the others.
    pub async fn lookup_all(&self, query: &str) -> Vec<ToolOutcome> {
        let calls = self.tools.iter().map(|tool| async move {
            let result = tool.lookup(query).await.map_err(|e| {
                warn!(tool = tool.name(), error = %e, "external tool failed");
                e.to_string()
            });
            ToolOutcome {
                tool: tool.name().to_string(),
                result,
            }
        });
        join_all(calls).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Delayed {
        name: &'static str,
        delay_ms: u64,
        fail: bool,
    }

    #[async_trait]
    impl ExternalTool for Delayed {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn lookup(&self, query: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if self.fail {
                anyhow::bail!("{} unreachable", self.name);
            }
            Ok(format!("{} results for {}", self.name, query))
        }
    }

    #[tokio::test]
    async fn outcomes_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Delayed { name: "slow", delay_ms: 30, fail: false }));
        registry.register(Box::new(Delayed { name: "broken", delay_ms: 0, fail: true }));
        registry.register(Box::new(Delayed { name: "fast", delay_ms: 1, fail: false }));

        let outcomes = registry.lookup_all("rust").await;
        let names: Vec<_> = outcomes.iter().map(|o| o.tool.as_str()).collect();
        assert_eq!(names, vec!["slow", "broken", "fast"]);
        assert_eq!(outcomes[0].result, Ok("slow results for rust".to_string()));
        assert_eq!(outcomes[1].result, Err("broken unreachable".to_string()));
        assert!(registry.find("fast").is_some());
        assert_eq!(registry.len(), 3);
    }
}
