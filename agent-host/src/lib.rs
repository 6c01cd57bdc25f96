//! Host-side capability layer for agent runtimes.
//!
//! Bundles the tool registry, the MCP protocol bridge, and the research
//! orchestrator behind feature flags so downstream users can enable only the
//! components they need.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Tool descriptors and registry (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// MCP bridge and search connectors (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Multi-source research orchestration (enabled by `research` feature).
#[cfg(feature = "research")]
pub use agent_research as research;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Configuration schema and loader (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;
