//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the agent host.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided call identifier could not be parsed.
    #[error("invalid call id: {source}")]
    InvalidCallId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A label did not match any known variant.
    #[error("unknown {kind} `{value}`")]
    UnknownVariant {
        /// Kind of label being parsed (e.g. "security level").
        kind: &'static str,
        /// The offending input.
        value: String,
    },

    /// Search result failed validation.
    #[error("invalid search result: {reason}")]
    InvalidSearchResult {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_owned(),
        }
    }

    pub(crate) fn invalid_result(reason: impl Into<String>) -> Self {
        Self::InvalidSearchResult {
            reason: reason.into(),
        }
    }
}
