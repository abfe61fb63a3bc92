//! Errors surfaced to callers of the request pipeline.

use jxn_core::{QueueError, TransportError};
use thiserror::Error;

/// Errors that can occur while running a request.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Neither the request nor the configuration names a target URI
    #[error("No request URI configured")]
    MissingRequestUri,

    /// A send, receive or command queue is full
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Every network attempt failed
    #[error("Request failed after {attempts} attempt(s): {source}")]
    Network {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        #[source]
        source: TransportError,
    },

    /// The call could not be encoded
    #[error("Failed to encode request: {0}")]
    Encoding(String),
}

impl RequestError {
    /// Whether the error came from the network rather than the client.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}
