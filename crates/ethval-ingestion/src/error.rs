//! Error types for the ingestion layer.
//!
//! We use a simple enum with `thiserror`. External errors are converted
//! into owned strings immediately, since the fetcher only logs them and
//! never needs the original error chain.

use thiserror::Error;

/// Errors that can occur during a single fetch attempt.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Transport errors (DNS, TLS, connection reset).
    #[error("network error: {0}")]
    Network(String),

    /// The attempt exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("HTTP {0}")]
    Status(u16),

    /// The body was not valid JSON.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// Configuration errors (e.g., client construction).
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for IngestionError {
    #[inline]
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IngestionError::Timeout
        } else if err.is_decode() {
            IngestionError::Decode(err.to_string())
        } else if err.is_builder() {
            IngestionError::Config(err.to_string())
        } else {
            IngestionError::Network(err.to_string())
        }
    }
}
