//! Error types for interception operations

use thiserror::Error;

/// Main error type for interception operations
#[derive(Debug, Error)]
pub enum MockError {
    /// Cross-context delivery failures
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// Persisted rule store failures
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Errors raised by the underlying network
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    /// Body capture errors
    #[error("Body capture error: {0}")]
    BodyCapture(#[from] BodyCaptureError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while moving envelopes between contexts
#[derive(Debug, Error)]
pub enum TransportError {
    /// The receiving context is gone
    #[error("channel closed")]
    Closed,
    /// The envelope could not be turned into a wire frame
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Errors raised by a rule store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed store document: {0}")]
    Parse(String),
}

/// Errors raised by a [`crate::network::Network`] implementation
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// Error types specific to response body capture operations
#[derive(Debug, Error)]
pub enum BodyCaptureError {
    /// Error reading from the response body stream
    #[error("Stream read error: {0}")]
    StreamRead(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            NetworkError::InvalidRequest(err.to_string())
        } else {
            NetworkError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}
