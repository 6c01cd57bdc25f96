//! Multi-source research orchestration.
//!
//! A [`ResearchOrchestrator`] fans one query out to every enabled
//! [`SourceConnector`](agent_adapters::traits::SourceConnector), tolerates
//! individual source failures, deduplicates by URL, optionally reranks, and
//! truncates to the caller's budget. [`research_tool`] exposes the same
//! pipeline through the tool registry.

#![warn(missing_docs, clippy::pedantic)]

mod dedup;
mod error;
mod orchestrator;
mod rerank;
mod tool;

pub use dedup::dedup_by_url;
pub use error::{ResearchError, ResearchResult};
pub use orchestrator::{
    DEFAULT_MAX_SOURCES, ResearchOptions, ResearchOrchestrator, ResearchOrchestratorBuilder,
    ResearchReport, SourceOutcome, SourceStatus,
};
pub use rerank::{Bm25Reranker, Reranker};
pub use tool::{RESEARCH_TOOL_NAME, research_tool};
