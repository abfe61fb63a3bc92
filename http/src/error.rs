//! Error types for the HTTP transport

use jxn_core::TransportError;
use thiserror::Error;

/// Errors that can occur while building an [`HttpTransport`](crate::HttpTransport)
#[derive(Debug, Error)]
pub enum HttpError {
    /// The base URL could not be parsed
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// The underlying client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

/// Map a reqwest failure onto the transport error the lifecycle retries on.
pub(crate) fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() || err.is_request() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}
