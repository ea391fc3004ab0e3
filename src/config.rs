//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//! [`load_config`] parses and validates in one step so the rest of the
//! program can trust the values it receives.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chunk_tokens(),
        }
    }
}

fn default_chunk_tokens() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_search_k")]
    pub search_k: usize,
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,
    #[serde(default = "default_context_k")]
    pub context_k: usize,
    #[serde(default = "default_context_threshold")]
    pub context_threshold: f32,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            search_k: default_search_k(),
            search_threshold: default_search_threshold(),
            context_k: default_context_k(),
            context_threshold: default_context_threshold(),
            max_context_tokens: default_max_context_tokens(),
            enabled: true,
        }
    }
}

fn default_collection() -> String {
    "research_documents".to_string()
}
fn default_search_k() -> usize {
    5
}
fn default_search_threshold() -> f32 {
    0.7
}
fn default_context_k() -> usize {
    10
}
fn default_context_threshold() -> f32 {
    0.2
}
fn default_max_context_tokens() -> usize {
    4000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override the provider endpoint (e.g. a remote Ollama host).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    5
}
fn default_embed_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on in-flight completions across all stages.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_llm_max_tokens(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
            base_url: None,
            api_key_env: None,
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_llm_model() -> String {
    "deepseek-r1-distill-llama-70b".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_max_tokens() -> u32 {
    4000
}
fn default_max_concurrency() -> usize {
    4
}
fn default_llm_retries() -> u32 {
    3
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_history_excerpt")]
    pub history_excerpt_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
            stage_timeout_secs: default_stage_timeout(),
            deadline_secs: default_deadline(),
            history_window: default_history_window(),
            history_excerpt_chars: default_history_excerpt(),
        }
    }
}

fn default_max_query_chars() -> usize {
    1000
}
fn default_stage_timeout() -> u64 {
    90
}
fn default_deadline() -> u64 {
    300
}
fn default_history_window() -> usize {
    5
}
fn default_history_excerpt() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptsConfig {
    /// Directory of `<stage>.txt` files overriding the built-in templates.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}
fn default_fetch_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// A config with every default and the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            prompts: PromptsConfig::default(),
            ingest: IngestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    let r = &config.retrieval;
    if r.search_k == 0 || r.context_k == 0 {
        bail!("retrieval.search_k and retrieval.context_k must be >= 1");
    }
    for (name, value) in [
        ("search_threshold", r.search_threshold),
        ("context_threshold", r.context_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }
    if r.max_context_tokens == 0 {
        bail!("retrieval.max_context_tokens must be > 0");
    }

    // The local provider falls back to a built-in model and its dims.
    let has_defaults = config.embedding.provider == "local";
    if config.embedding.is_enabled() {
        if config.embedding.dims == Some(0) || (config.embedding.dims.is_none() && !has_defaults) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() && !has_defaults {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "groq" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled, groq, openai, or ollama.",
            other
        ),
    }
    if config.llm.max_concurrency == 0 {
        bail!("llm.max_concurrency must be >= 1");
    }
    if config.llm.timeout_secs == 0 {
        bail!("llm.timeout_secs must be > 0");
    }

    let p = &config.pipeline;
    if p.max_query_chars == 0 {
        bail!("pipeline.max_query_chars must be > 0");
    }
    if p.stage_timeout_secs == 0 || p.deadline_secs == 0 {
        bail!("pipeline.stage_timeout_secs and pipeline.deadline_secs must be > 0");
    }

    Ok(())
}
