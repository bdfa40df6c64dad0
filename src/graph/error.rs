//! Typed errors for authenticated API calls
//!
//! Keeps "the provider told us about an error" (`Api`) apart from "we could
//! not understand the provider's response" (`Decode`).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiCallError {
    /// Non-success HTTP status; the body is not inspected
    #[error("{status}: {reason}")]
    Transport { status: u16, reason: String },

    /// Application-level error embedded in a successful response
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// Response body was not the expected JSON document
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Connection or timeout failure before any response arrived
    #[error("Network error: {0}")]
    Network(String),
}

impl ApiCallError {
    /// Build a `Transport` error from an HTTP status
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        ApiCallError::Transport {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
        }
    }

    /// Convert network/connection errors
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiCallError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ApiCallError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            Self::from_status(status)
        } else {
            ApiCallError::Network(e.to_string())
        }
    }
}
