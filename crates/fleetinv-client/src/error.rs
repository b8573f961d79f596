//! Error types for the fleetinv client

use thiserror::Error;

/// Errors that can occur when using the fleetinv client
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// API returned an error status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Machine-readable error code, when the body carried one
        code: Option<String>,
        /// Error message from server
        message: String,
    },
}

impl ClientError {
    /// Check if the server rejected a report for referencing a stale type
    ///
    /// Agents react to this by refreshing their plugin metadata.
    #[must_use]
    pub fn is_stale_type(&self) -> bool {
        matches!(self, ClientError::Api { code: Some(code), .. } if code == "STALE_TYPE")
    }

    /// Check if the server rejected a report as structurally invalid
    #[must_use]
    pub fn is_invalid_report(&self) -> bool {
        matches!(self, ClientError::Api { code: Some(code), .. } if code == "INVALID_REPORT")
    }

    /// Check if the request may succeed when retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout => true,
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
