//! Shared source connector traits and data structures.

use std::time::Duration;

use agent_primitives::{SearchResult, SourceType};
use async_trait::async_trait;
use thiserror::Error;

/// Result alias used by source connectors.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error type shared by connector implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Connector is misconfigured or missing credentials.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The supplied request was invalid for the target provider.
    #[error("invalid search request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// Transport-level failures (network, TLS, timeouts).
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("adapter rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The provider returned a malformed or unsuccessful response.
    #[error("adapter response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },
}

impl AdapterError {
    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for response failures.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }
}

/// Query submitted to a source connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    query: String,
    max_results: Option<usize>,
}

impl SearchRequest {
    /// Creates a request for the supplied query.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] if the query is blank.
    pub fn new(query: impl Into<String>) -> AdapterResult<Self> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(AdapterError::invalid_request("search query cannot be empty"));
        }

        Ok(Self {
            query,
            max_results: None,
        })
    }

    /// Caps the number of results the connector returns.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Returns the query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the requested result cap, if any.
    #[must_use]
    pub const fn max_results(&self) -> Option<usize> {
        self.max_results
    }
}

/// Trait implemented by every search source.
///
/// A connector that aggregates several providers must only fail when every
/// provider failed; partial failures are its own concern.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Stable connector name used in logs and reports.
    fn name(&self) -> &str;

    /// Category of results this connector produces.
    fn source_type(&self) -> SourceType;

    /// Working budget applied when the request carries no explicit cap.
    fn default_budget(&self) -> usize;

    /// Runs the query against the underlying provider(s).
    async fn search(&self, request: &SearchRequest) -> AdapterResult<Vec<SearchResult>>;
}
