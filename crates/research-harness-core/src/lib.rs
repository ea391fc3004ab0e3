//! # Research Harness Core
//!
//! Runtime-agnostic logic for Research Harness: the typed research state
//! threaded through the pipeline, the paragraph chunker, the chunk store and
//! recency store abstractions, and the retrieval scoring / context assembly
//! algorithms.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! The `research-harness` application crate supplies embedding providers,
//! LLM adapters, SQLite-backed stores, and the pipeline orchestrator.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod recency;
pub mod retrieval;
pub mod state;
pub mod store;
