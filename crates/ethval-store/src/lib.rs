//! ethval-store: Table store access for the ETHval collector.
//!
//! This crate provides the [`Store`] trait the pipeline writes through,
//! a PostgREST implementation for the hosted store and an in-memory
//! implementation for tests, plus the [`UpsertBatcher`] that turns a
//! record set into bounded chunks.
//!
//! # Overview
//!
//! The store is treated as an external table engine that can merge rows
//! on a conflict key. The pipeline only ever needs two operations:
//!
//! - `upsert(table, rows, conflict_columns)`: insert-or-replace whole rows
//! - `select(query)`: read columns back, ordered and optionally limited
//!
//! # Example
//!
//! ```rust
//! use ethval_store::{MemoryStore, Query, UpsertBatcher};
//! use ethval_types::{DatasetDescriptor, NaiveDate, Provenance, Record};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let descriptor = DatasetDescriptor::new("ethereum_tvl", "historical_ethereum_tvl", &["tvl"]);
//!     let records = vec![Record::new(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         Provenance::Observed("defillama"),
//!     )
//!     .with_field("tvl", 1.0)];
//!
//!     let saved = UpsertBatcher::default().upsert(&store, &descriptor, &records).await;
//!     assert_eq!(saved, 1);
//!     assert_eq!(store.len("historical_ethereum_tvl"), 1);
//! }
//! ```
//!
//! # Atomicity
//!
//! A single `upsert` call is atomic as far as the backing store makes it
//! so. Nothing spans calls: a batch split into chunks can land partially.

mod batcher;
pub mod config;
mod error;
mod memory;
mod postgrest;

pub use batcher::{UpsertBatcher, DEFAULT_CHUNK_SIZE};
pub use config::StoreConfig;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

pub use ethval_types::Row;

/// Sort direction for [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A read against one table.
///
/// # Example
///
/// ```rust
/// use ethval_store::Query;
///
/// let latest = Query::table("historical_gas_burn")
///     .columns(&["date"])
///     .order_desc("date")
///     .limit(1);
/// assert_eq!(latest.limit, Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Table to read.
    pub table: String,
    /// Columns to return; empty means all.
    pub columns: Vec<String>,
    /// Optional sort column and direction.
    pub order_by: Option<(String, Direction)>,
    /// Optional maximum number of rows.
    pub limit: Option<usize>,
}

impl Query {
    /// Start a query against `table`.
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Restrict the returned columns (builder pattern).
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Sort ascending by `column` (builder pattern).
    pub fn order_asc(mut self, column: &str) -> Self {
        self.order_by = Some((column.to_string(), Direction::Ascending));
        self
    }

    /// Sort descending by `column` (builder pattern).
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order_by = Some((column.to_string(), Direction::Descending));
        self
    }

    /// Cap the number of rows (builder pattern).
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Upsert-capable table store.
///
/// Uses native async syntax (Rust 1.75+) rather than `async_trait`.
///
/// ## Implementors
///
/// - [`PostgrestStore`]: Production implementation over PostgREST
/// - [`MemoryStore`]: Test implementation with failure injection
pub trait Store: Send + Sync {
    /// Insert `rows` into `table`, replacing any stored row whose
    /// `conflict` columns match. Replacement is whole-row.
    fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict: &[&str],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Read rows described by `query`.
    fn select(
        &self,
        query: &Query,
    ) -> impl std::future::Future<Output = Result<Vec<Row>, StoreError>> + Send;
}
