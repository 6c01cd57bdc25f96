//! Adapters connecting the agent host to external services.
//!
//! [`mcp`] bridges tools exposed by Model Context Protocol servers into the
//! local tool registry. [`search`] holds the source connectors that normalise
//! web and academic search providers into [`agent_primitives::SearchResult`]
//! values. Both share the HTTPS client and error types defined here and in
//! [`traits`].

#![warn(missing_docs, clippy::pedantic)]

pub mod mcp;
pub mod search;
pub mod traits;

mod http_client;
