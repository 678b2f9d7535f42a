//! Error types for ethval-types.

use thiserror::Error;

/// Errors that can occur when turning records into store rows.
#[derive(Debug, Error)]
pub enum TypeError {
    /// A numeric column holds NaN or an infinity.
    #[error("non-finite value in column {column}")]
    NonFinite { column: &'static str },

    /// The table is keyed by a dimension the record does not carry.
    #[error("record for {table} is missing dimension {column}")]
    MissingDimension {
        table: &'static str,
        column: &'static str,
    },
}
