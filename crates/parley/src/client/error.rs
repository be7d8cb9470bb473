//! Chat client error types.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while sending a message through the relay.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Message has no text and no attachment.
    #[error("Message is empty")]
    EmptyMessage,

    /// Target session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A response is already streaming into this session.
    #[error("Session {0} is already waiting for a response")]
    SessionBusy(String),

    /// HTTP request failed or the body broke mid-read.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Relay answered with an error status.
    #[error("Relay returned status {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    /// Local state could not be updated.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Whether the failure happened on the wire rather than locally.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::RequestFailed(_) | Self::Status { .. })
    }
}
