//! Configuration management for the agent host.
//!
//! [`schema`] holds the strongly typed, validated configuration values;
//! [`loader`] reads them from JSON documents and the environment.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use schema::{ConfigError, HostConfig, McpServerConfig, McpTransportKind, ResearchSettings};
