//! Error types for the autopost pipeline.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AutopostError>;

/// Errors raised by pipeline components.
///
/// Soft-fail components (feed reader, social adapters, storefront upload)
/// log these and hand back an empty result instead of propagating them.
#[derive(Debug, Error)]
pub enum AutopostError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote API answered with a non-success status
    #[error("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// GraphQL top-level errors or mutation user errors
    #[error("{service} GraphQL errors: {}", .messages.join(", "))]
    GraphQl {
        service: &'static str,
        messages: Vec<String>,
    },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feed could not be parsed
    #[error("Feed error: {0}")]
    Feed(String),

    /// Image payload could not be produced or decoded
    #[error("Image error: {0}")]
    Image(String),

    /// Text generation failed on every provider
    #[error("Content generation failed: {0}")]
    Content(#[from] llm::LlmError),

    /// Prompt template failed to render
    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Prompt template failed to compile
    #[error("Template syntax error: {0}")]
    TemplateSyntax(#[from] handlebars::TemplateError),

    /// Google auth or Sheets error
    #[error("Sheets error: {0}")]
    Sheets(String),

    /// Remote response did not have the expected shape
    #[error("Unexpected {service} response: {detail}")]
    UnexpectedResponse {
        service: &'static str,
        detail: String,
    },
}

impl AutopostError {
    pub(crate) fn unexpected(service: &'static str, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            service,
            detail: detail.into(),
        }
    }
}

/// Turn a non-success HTTP response into [`AutopostError::Api`], keeping the
/// most useful message the body offers.
pub(crate) async fn api_error(service: &'static str, response: reqwest::Response) -> AutopostError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error_description"))
                .or_else(|| v.get("errors"))
                .map(|m| m.as_str().map_or_else(|| m.to_string(), str::to_string))
        })
        .unwrap_or(body);

    AutopostError::Api {
        service,
        status,
        message,
    }
}
