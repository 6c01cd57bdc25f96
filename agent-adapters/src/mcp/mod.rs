//! Model Context Protocol bridge.
//!
//! An [`McpClient`] owns the connection to one MCP server over a pluggable
//! [`transport::Transport`]. An [`McpToolBridge`] discovers the server's tools
//! and registers each one in a [`agent_tools::registry::ToolRegistry`] so that
//! callers invoke remote tools exactly like local ones.
//!
//! Two error conventions meet here. A failed *call* to the server is an
//! [`McpError`]; a remote tool's own failure is data carried in
//! [`McpToolResult::error`]. The bridge turns the latter into a raised
//! [`agent_tools::registry::ToolError`] when it executes a bridged tool.

mod bridge;
mod client;
mod error;
mod protocol;
mod rpc;
pub mod transport;

#[cfg(test)]
mod testing;

pub use bridge::{MCP_TOOL_VERSION, McpToolBridge, connect_all, connect_all_with};
pub use client::{Backoff, ConnectionState, McpClient, McpClientOptions};
pub use error::{McpError, McpResult};
pub use protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION,
    METHOD_NOT_FOUND, McpToolCall, McpToolDefinition, McpToolResult, ServerInfo,
};
