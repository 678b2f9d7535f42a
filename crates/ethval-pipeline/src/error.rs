//! Error types for the pipeline.

use thiserror::Error;

/// Errors that end a single collection task.
///
/// Source failures are not errors here: the fetcher reports them as "no
/// data" and the task moves on to its fallback. What remains are failures
/// reading derivation inputs back from the store and malformed URLs in the
/// dataset table.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Error from the store layer.
    #[error("store error: {0}")]
    Store(#[from] ethval_store::StoreError),

    /// A source URL did not parse.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A per-dimension base URL cannot take path segments.
    #[error("cannot append a path segment to {0}")]
    NotABase(String),
}
