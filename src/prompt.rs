//! Prompt templates, the prompt library, and completion clean-up.
//!
//! Templates use `{{name}}` placeholders. Each built-in template declares
//! the placeholders it must contain, and rendering fails if a placeholder
//! has no value, so a broken override is caught instead of silently sending
//! `{{query}}` to the model.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use research_harness_core::state::StageId;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").unwrap())
}

fn reasoning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<think>.*?</think>|<thinking>.*?</thinking>|<reasoning>.*?</reasoning>")
            .unwrap()
    })
}

/// An immutable prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    text: String,
    placeholders: BTreeSet<String>,
}

impl PromptTemplate {
    /// Parse `text`, requiring every name in `required` to appear as a
    /// placeholder.
    pub fn parse(name: &str, text: &str, required: &[&str]) -> Result<Self> {
        let placeholders: BTreeSet<String> = placeholder_re()
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect();

        for r in required {
            if !placeholders.contains(*r) {
                bail!("prompt '{}' is missing the {{{{{}}}}} placeholder", name, r);
            }
        }

        Ok(Self {
            name: name.to_string(),
            text: text.to_string(),
            placeholders,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(String::as_str)
    }

    /// Substitute every placeholder in one pass. Values are inserted
    /// verbatim, so `{{...}}` inside a value is never expanded.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut last = 0;

        for caps in placeholder_re().captures_iter(&self.text) {
            let whole = caps.get(0).context("regex match without group 0")?;
            let key = &caps[1];
            let value = vars
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .with_context(|| format!("prompt '{}' has no value for '{}'", self.name, key))?;
            out.push_str(&self.text[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&self.text[last..]);
        Ok(out)
    }
}

/// Remove model reasoning markup from a completion.
///
/// Drops `<think>`, `<thinking>` and `<reasoning>` blocks, and any preamble
/// ended by a dangling `</think>` (some models omit the opening tag).
pub fn strip_reasoning(text: &str) -> String {
    let without_blocks = reasoning_re().replace_all(text, "");
    let tail = match without_blocks.rfind("</think>") {
        Some(pos) => &without_blocks[pos + "</think>".len()..],
        None => &without_blocks[..],
    };
    tail.trim().to_string()
}

/// Labeled sections rendered in insertion order:
///
/// ```text
/// Label:
/// body
///
/// Next Label:
/// body
/// ```
#[derive(Debug, Default)]
pub struct Sections {
    parts: Vec<(String, String)>,
}

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, label: &str, body: &str) -> Self {
        self.parts.push((label.to_string(), body.trim().to_string()));
        self
    }

    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|(label, body)| format!("{}:\n{}", label, body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Template used by the Retrieval stage when no context was found.
pub const RETRIEVAL_FALLBACK: &str = "retrieval_fallback";

struct Builtin {
    stem: &'static str,
    text: &'static str,
    required: &'static [&'static str],
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        stem: "search",
        text: include_str!("../prompts/search.txt"),
        required: &["query"],
    },
    Builtin {
        stem: "context_analysis",
        text: include_str!("../prompts/context_analysis.txt"),
        required: &["query", "history"],
    },
    Builtin {
        stem: "retrieval",
        text: include_str!("../prompts/retrieval.txt"),
        required: &["query", "context"],
    },
    Builtin {
        stem: RETRIEVAL_FALLBACK,
        text: include_str!("../prompts/retrieval_fallback.txt"),
        required: &["query"],
    },
    Builtin {
        stem: "tool_aggregation",
        text: include_str!("../prompts/tool_aggregation.txt"),
        required: &["query", "sources"],
    },
    Builtin {
        stem: "synthesis",
        text: include_str!("../prompts/synthesis.txt"),
        required: &["query", "input"],
    },
    Builtin {
        stem: "report_generation",
        text: include_str!("../prompts/report_generation.txt"),
        required: &["query", "input"],
    },
];

/// Every template the pipeline uses, keyed by file stem.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: BTreeMap<String, PromptTemplate>,
}

impl PromptLibrary {
    /// The compiled-in templates.
    pub fn builtin() -> Result<Self> {
        let mut templates = BTreeMap::new();
        for b in BUILTINS {
            templates.insert(b.stem.to_string(), PromptTemplate::parse(b.stem, b.text, b.required)?);
        }
        Ok(Self { templates })
    }

    /// Built-in templates overridden by `<stem>.txt` files in `dir`.
    ///
    /// A file whose stem is neither a stage name nor `retrieval_fallback`
    /// is rejected, as is an override missing a required placeholder.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut lib = Self::builtin()?;
        let Some(dir) = dir else {
            return Ok(lib);
        };
        if !dir.is_dir() {
            return Ok(lib);
        }

        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompt directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            if stem != RETRIEVAL_FALLBACK {
                stem.parse::<StageId>()
                    .with_context(|| format!("Unknown prompt file {}", path.display()))?;
            }
            let builtin = BUILTINS
                .iter()
                .find(|b| b.stem == stem)
                .with_context(|| format!("Unknown prompt file {}", path.display()))?;

            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            lib.templates.insert(
                stem.clone(),
                PromptTemplate::parse(&stem, &text, builtin.required)?,
            );
        }
        Ok(lib)
    }

    pub fn get(&self, stem: &str) -> Result<&PromptTemplate> {
        self.templates
            .get(stem)
            .with_context(|| format!("No prompt template named '{}'", stem))
    }

    pub fn for_stage(&self, stage: StageId) -> Result<&PromptTemplate> {
        self.get(stage.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_placeholders() {
        let t = PromptTemplate::parse("t", "Q: {{query}} / {{ query }} / {{input}}", &["query"]).unwrap();
        let out = t.render(&[("query", "rust"), ("input", "data")]).unwrap();
        assert_eq!(out, "Q: rust / rust / data");
    }

    #[test]
    fn render_does_not_expand_values() {
        let t = PromptTemplate::parse("t", "{{query}} {{input}}", &[]).unwrap();
        let out = t.render(&[("query", "{{input}}"), ("input", "x")]).unwrap();
        assert_eq!(out, "{{input}} x");
    }

    #[test]
    fn missing_value_or_placeholder_is_an_error() {
        let t = PromptTemplate::parse("t", "{{query}}", &["query"]).unwrap();
        assert!(t.render(&[]).is_err());
        assert!(PromptTemplate::parse("t", "no placeholders", &["query"]).is_err());
    }

    #[test]
    fn reasoning_blocks_are_stripped() {
        assert_eq!(strip_reasoning("<think>hmm\nok</think>\nAnswer"), "Answer");
        assert_eq!(strip_reasoning("<THINKING>x</THINKING>A<reasoning>y</reasoning>B"), "AB");
        assert_eq!(strip_reasoning("preamble without opener</think>  Final"), "Final");
        assert_eq!(strip_reasoning("plain text"), "plain text");
    }

    #[test]
    fn sections_keep_insertion_order() {
        let s = Sections::new()
            .push("Search Summary", "a")
            .push("Historical Context", " b ")
            .render();
        assert_eq!(s, "Search Summary:\na\n\nHistorical Context:\nb");
    }

    #[test]
    fn builtin_library_has_every_stage() {
        let lib = PromptLibrary::builtin().unwrap();
        for id in StageId::ORDER {
            lib.for_stage(id).unwrap();
        }
        lib.get(RETRIEVAL_FALLBACK).unwrap();
    }

    #[test]
    fn overrides_replace_and_unknown_stems_fail() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("search.txt"), "Custom: {{query}}").unwrap();
        let lib = PromptLibrary::load(Some(dir.path())).unwrap();
        let out = lib.for_stage(StageId::Search).unwrap().render(&[("query", "q")]).unwrap();
        assert_eq!(out, "Custom: q");

        std::fs::write(dir.path().join("summarize.txt"), "{{query}}").unwrap();
        assert!(PromptLibrary::load(Some(dir.path())).is_err());
    }

    #[test]
    fn override_missing_placeholder_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("retrieval.txt"), "Only {{query}}").unwrap();
        assert!(PromptLibrary::load(Some(dir.path())).is_err());
    }
}
