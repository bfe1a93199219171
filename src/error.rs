//! Error types for talking to the imgenie server.

use thiserror::Error;

/// Everything that can go wrong during one API round-trip.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, timeout...)
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered but reported a failure (`success: false`,
    /// `error` or `message`)
    #[error("{0}")]
    Server(String),

    /// The response body didn't have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(String),
}

impl ApiError {
    /// Message suitable for a user-facing notification. Prefers whatever the
    /// server said over transport details.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            ApiError::Server(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Convenience alias for API results.
pub type ApiResult<T> = Result<T, ApiError>;
