use thiserror::Error;

/// Result alias for MCP client operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors raised while talking to an MCP server.
///
/// A remote tool reporting its own failure is not an `McpError`; see
/// [`McpToolResult::error`](super::McpToolResult).
#[derive(Debug, Error)]
pub enum McpError {
    /// Handshake or transport setup failed.
    #[error("failed to connect to MCP server `{server}`: {reason}")]
    Connection {
        /// Configured server name.
        server: String,
        /// Underlying cause.
        reason: String,
    },

    /// Operation attempted while the client is not connected.
    #[error("MCP client for `{server}` is not connected")]
    NotConnected {
        /// Configured server name.
        server: String,
    },

    /// No response arrived within the configured deadline.
    #[error("MCP server `{server}` did not answer `{operation}` in time")]
    Timeout {
        /// Configured server name.
        server: String,
        /// JSON-RPC method that timed out.
        operation: String,
    },

    /// Server response was malformed or unexpected.
    #[error("MCP protocol error: {reason}")]
    Protocol {
        /// What was wrong with the response.
        reason: String,
    },

    /// The established connection failed while sending or receiving.
    #[error("MCP transport error: {reason}")]
    Transport {
        /// Underlying cause.
        reason: String,
    },

    /// Server answered with a JSON-RPC error object.
    #[error("MCP server returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Server-supplied message.
        message: String,
    },
}

impl McpError {
    /// Convenience constructor for protocol errors.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport errors.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Returns `true` when retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}
