//! Wiring: builds the stores, engine, LLM adapter and pipeline from a
//! [`Config`].

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use research_harness_core::recency::RecencyStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_llm;
use crate::migrate;
use crate::pipeline::{PipelineDeps, PipelineSettings, ResearchPipeline};
use crate::prompt::PromptLibrary;
use crate::recency::SqliteRecencyStore;
use crate::retrieval::RetrievalEngine;
use crate::sqlite_store::SqliteChunkStore;
use crate::tools::ToolRegistry;

pub struct Harness {
    pub config: Config,
    pub engine: Arc<RetrievalEngine>,
    pub recency: Arc<dyn RecencyStore>,
    pub pipeline: ResearchPipeline,
}

impl Harness {
    /// Open the database (running migrations), then build every component.
    ///
    /// A misconfigured embedder leaves the engine in place but unable to
    /// embed, so retrieval falls back; a misconfigured LLM makes stages
    /// degrade. Neither prevents the harness from opening.
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_tools(config, ToolRegistry::new()).await
    }

    pub async fn open_with_tools(config: Config, tools: ToolRegistry) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        let embedder = match create_embedder(&config.embedding) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "embedding provider unavailable, retrieval will fall back");
                create_embedder(&Default::default())?
            }
        };

        let store = Arc::new(SqliteChunkStore::new(pool.clone(), config.db.path.clone()));
        let engine = Arc::new(RetrievalEngine::new(store, embedder, config.retrieval.clone()));
        let recency: Arc<dyn RecencyStore> = Arc::new(SqliteRecencyStore::new(pool));

        let prompts = PromptLibrary::load(config.prompts.dir.as_deref())?;
        let settings = PipelineSettings::from_config(&config.pipeline, config.retrieval.max_context_tokens);
        let pipeline = ResearchPipeline::new(
            PipelineDeps {
                llm: create_llm(&config.llm),
                engine: config.retrieval.enabled.then(|| engine.clone()),
                recency: recency.clone(),
                tools: Arc::new(tools),
                prompts,
            },
            settings,
        )?;

        Ok(Self {
            config,
            engine,
            recency,
            pipeline,
        })
    }
}
