//! ethval-types: Shared data structures for the ETHval collector.
//!
//! This crate defines the types every stage of the pipeline agrees on:
//! - [`Record`] - A canonical, date-keyed row headed for one dataset table
//! - [`FieldValue`] - A typed value column (number, integer, text or null)
//! - [`Provenance`] - Where a record came from (observed, calculated, estimated)
//! - [`DatasetDescriptor`] - Target table, conflict key and value columns
//! - [`Precision`] - Fixed decimal rounding applied before storage
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use ethval_types::{DatasetDescriptor, Provenance, Record};
//!
//! let descriptor = DatasetDescriptor::new("ethereum_tvl", "historical_ethereum_tvl", &["tvl"]);
//!
//! let record = Record::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     Provenance::Observed("defillama"),
//! )
//! .with_field("tvl", 52_000_000_000.0);
//!
//! let row = record.to_row(&descriptor).unwrap();
//! assert_eq!(row["date"], "2024-01-01");
//! assert_eq!(row["source"], "defillama");
//! ```

mod descriptor;
mod error;
mod precision;
mod provenance;
mod record;

pub use descriptor::{ConflictKey, DatasetDescriptor};
pub use error::TypeError;
pub use precision::{round_decimal, Precision};
pub use provenance::Provenance;
pub use record::{FieldValue, Record, RecordKey, Row};

// Re-export chrono::NaiveDate for convenience
pub use chrono::NaiveDate;
