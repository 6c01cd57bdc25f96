use thiserror::Error;

/// Result alias for research operations.
pub type ResearchResult<T> = Result<T, ResearchError>;

/// Failures raised by the research pipeline itself.
///
/// Individual source failures are isolated and never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResearchError {
    /// The configured reranker faulted.
    #[error("rerank failed: {reason}")]
    Rerank {
        /// Human-readable reason.
        reason: String,
    },

    /// The request could not be interpreted.
    #[error("invalid research request: {reason}")]
    InvalidRequest {
        /// Human-readable reason.
        reason: String,
    },
}

impl ResearchError {
    /// Creates a [`ResearchError::Rerank`].
    #[must_use]
    pub fn rerank(reason: impl Into<String>) -> Self {
        Self::Rerank {
            reason: reason.into(),
        }
    }

    /// Creates a [`ResearchError::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}
