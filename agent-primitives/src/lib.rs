//! Core shared types for the agent host capability layer.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod error;
mod ids;
mod search;

/// Capability classification used to tag and gate tools.
pub use capability::{SecurityLevel, ToolTag};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Correlation identifier for remote tool calls.
pub use ids::CallId;
/// Normalised search results produced by source connectors.
pub use search::{AcademicProvider, SearchResult, SearchResultBuilder, SourceType};
