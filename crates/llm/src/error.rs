//! Error types for text-generation providers.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur while talking to a text-generation provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider has no API key.
    #[error("{provider} is not configured ({env_var} not set)")]
    NotConfigured {
        provider: &'static str,
        env_var: &'static str,
    },

    /// The HTTP request could not be completed.
    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// The response could not be turned into the expected shape.
    #[error("Failed to parse AI response: {reason}")]
    ResponseParse { reason: String },

    /// Every provider in a chain failed.
    #[error("All providers failed: {0}")]
    Exhausted(String),
}

impl LlmError {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::ResponseParse {
            reason: reason.into(),
        }
    }
}
