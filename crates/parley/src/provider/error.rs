//! Completion provider error types.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised while talking to the upstream completion API.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be built or sent.
    #[error("Failed to connect to provider at {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// The provider answered with a non-success status.
    #[error("Provider returned status {0}")]
    Status(reqwest::StatusCode),

    /// The provider answered with something other than an event stream.
    #[error("Provider returned unexpected content type: {0}")]
    ContentType(String),

    /// The event stream broke after it was opened.
    #[error("Provider stream failed: {0}")]
    Stream(String),

    /// A stream chunk could not be decoded.
    #[error("Failed to parse provider chunk: {0}")]
    ParseError(String),
}

impl From<reqwest_eventsource::Error> for ProviderError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        match err {
            reqwest_eventsource::Error::InvalidStatusCode(status, _) => Self::Status(status),
            reqwest_eventsource::Error::InvalidContentType(content_type, _) => Self::ContentType(
                content_type.to_str().unwrap_or("<non-ascii>").to_string(),
            ),
            other => Self::Stream(other.to_string()),
        }
    }
}
