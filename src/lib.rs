//! # Research Harness
//!
//! A multi-stage LLM research pipeline with a local retrieval engine and a
//! durable memory of past reports.
//!
//! A query fans out to four gather stages that run concurrently, then flows
//! through synthesis into a final report. Every stage is isolated: a failing
//! or slow stage contributes a placeholder instead of aborting the run.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────┐
//!                │      Search      │──┐
//!                ├──────────────────┤  │
//!   query ──────▶│ Context-Analysis │──┤   ┌───────────┐   ┌────────┐
//!                ├──────────────────┤  ├──▶│ Synthesis │──▶│ Report │
//!                │    Retrieval     │──┤   └───────────┘   └────────┘
//!                ├──────────────────┤  │
//!                │ Tool-Aggregation │──┘
//!                └──────────────────┘
//!                    │          │
//!             ┌──────┘          └──────┐
//!             ▼                        ▼
//!      ┌────────────┐           ┌────────────┐
//!      │  SQLite    │           │  SQLite    │
//!      │  chunks    │           │  memory    │
//!      └────────────┘           └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rsh init                                # create database
//! rsh ingest notes/ paper.md              # load documents
//! rsh ask "what does the paper claim?"    # retrieval only
//! rsh research "state of solid-state batteries"
//! rsh memory list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`harness`] | Builds every component from a config |
//! | [`pipeline`] | Stage orchestration, timeouts and deadline |
//! | [`stages`] | The six pipeline stages |
//! | [`llm`] | Chat-completions adapter and concurrency pool |
//! | [`prompt`] | Prompt templates and reasoning stripping |
//! | [`retrieval`] | Embedding-backed retrieval engine |
//! | [`ingest`] | File, directory and URL ingestion |
//! | [`embedding`] | Embedding providers |
//! | [`tools`] | External lookup tools |
//! | [`sqlite_store`] | SQLite chunk store |
//! | [`recency`] | SQLite memory of past reports |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod harness;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod migrate;
pub mod pipeline;
pub mod prompt;
pub mod recency;
pub mod research;
pub mod retrieval;
pub mod sqlite_store;
pub mod stages;
pub mod stats;
pub mod tools;
