//! Network error types for WebSocket communication
//!
//! This module defines error types used throughout the network layer.

use thiserror::Error;

/// Network-related errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to connect to server
    #[error("Failed to connect to server: {0}")]
    ConnectionFailed(String),

    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Connection or write timeout
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize message
    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Failed to build HTTP request
    #[error("Failed to build HTTP request: {0}")]
    HttpError(String),

    /// Peer closed with a code other than normal/going-away
    #[error("Connection closed unexpectedly (code {code}): {reason}")]
    UnexpectedClose { code: u16, reason: String },

    /// Connection already closed locally
    #[error("Connection closed")]
    ConnectionClosed,

    /// Every send attempt failed
    #[error("Send failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<NetworkError>,
    },

    /// Shutdown was requested while the operation was pending
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NetworkError {
    /// Whether this error ends the session
    ///
    /// Cancellation is the session ending on purpose, not a failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetworkError::Cancelled)
    }
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<tokio_tungstenite::tungstenite::http::Error> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        NetworkError::HttpError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue) -> Self {
        NetworkError::HttpError(err.to_string())
    }
}
