//! Error types for the language-model client.

use thiserror::Error;

/// Errors produced while talking to the model API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("model API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The API answered without any content.
    #[error("model returned an empty response")]
    EmptyResponse,
    /// The configured base URL is invalid.
    #[error("invalid model API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Convenience result alias for model calls.
pub type LlmResult<T> = Result<T, LlmError>;
