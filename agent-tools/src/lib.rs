//! Tool discovery and invocation utilities.
//!
//! Every invocable capability, whether implemented locally or bridged from a
//! remote server, is described by a [`registry::ToolDescriptor`] and stored in
//! a [`registry::ToolRegistry`]. Schemas are carried as [`schema::ToolSchema`]
//! payloads with an optional pluggable validator.

#![warn(missing_docs, clippy::pedantic)]

pub mod registry;
pub mod schema;
