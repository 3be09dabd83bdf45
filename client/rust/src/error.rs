//! Error types for the photolink client library.

use serde::Deserialize;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error body returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiFailure {
    pub error: String,
    pub code: String,
    pub retryable: bool,
    pub details: Option<serde_json::Value>,
}

/// Errors that can occur during client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error the call does not model as an outcome.
    #[error("api error ({status}): {}", .failure.error)]
    Api { status: u16, failure: ApiFailure },

    /// No credential configured for an authenticated call.
    #[error("missing credential")]
    MissingCredential,

    /// Invalid argument provided by caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Machine-readable API error code.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { failure, .. } => Some(failure.code.as_str()),
            _ => None,
        }
    }

    /// Returns true if the credential was missing, invalid or expired.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ClientError::MissingCredential) || self.status() == Some(401)
    }

    /// Returns true if repeating the call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Api { failure, .. } => failure.retryable,
            ClientError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
