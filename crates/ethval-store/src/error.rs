//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur when reading from or writing to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered but refused the operation.
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Missing or invalid connection settings.
    #[error("config error: {0}")]
    Config(String),

    /// The store URL could not be built.
    #[error("invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
