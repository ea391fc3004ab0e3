//! LLM invocation adapter.
//!
//! Every stage talks to the model through [`LlmClient`]: prompt in,
//! completion text out. The concrete client speaks the OpenAI-compatible
//! chat-completions protocol, which Groq, OpenAI and Ollama all serve.
//!
//! [`PooledLlm`] bounds in-flight completions with a semaphore so the
//! concurrent gather stages cannot exceed `llm.max_concurrency`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::ResearchError;
use crate::http;

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send one user prompt and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        _ => "https://api.groq.com/openai/v1",
    }
}

fn default_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "groq" => Some("GROQ_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let key_env = config
            .api_key_env
            .clone()
            .or_else(|| default_key_env(&config.provider).map(str::to_string));

        let api_key = match key_env {
            Some(var) => Some(std::env::var(&var).map_err(|_| {
                ResearchError::configuration("llm", format!("{} environment variable not set", var))
            })?),
            None => None,
        };

        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(&config.provider).to_string()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        debug!(model = %self.model, prompt_chars = prompt.len(), "chat completion");

        let resp = http::post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            "LLM API",
        )
        .await?;
        parse_completion(&resp)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid LLM response: missing choices[0].message.content"))
}

/// Fails every call with the configuration problem that prevented a real
/// client from being built. Stages using it degrade to their placeholder.
pub struct UnavailableLlm {
    reason: String,
}

impl UnavailableLlm {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmClient for UnavailableLlm {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(ResearchError::configuration("llm", self.reason.clone()).into())
    }
}

/// Wraps a client so that at most `permits` completions run at once.
pub struct PooledLlm {
    inner: Arc<dyn LlmClient>,
    permits: Arc<Semaphore>,
}

impl PooledLlm {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrency: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for PooledLlm {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let _permit = self.permits.acquire().await?;
        self.inner.complete(prompt).await
    }
}

/// Build the pooled client for `config`. A configuration problem (missing
/// API key, `provider = "disabled"`) yields an [`UnavailableLlm`] and a
/// warning instead of an error, so the pipeline still produces a report.
pub fn create_llm(config: &LlmConfig) -> Arc<dyn LlmClient> {
    let inner: Arc<dyn LlmClient> = if config.provider == "disabled" {
        Arc::new(UnavailableLlm::new("provider is disabled"))
    } else {
        match ChatCompletionsClient::new(config) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(provider = %config.provider, error = %e, "LLM unavailable, stages will degrade");
                Arc::new(UnavailableLlm::new(e.to_string()))
            }
        }
    };
    Arc::new(PooledLlm::new(inner, config.max_concurrency))
}
