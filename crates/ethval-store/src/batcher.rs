//! Chunked upserts with partial-batch resilience.

use crate::Store;
use ethval_types::{DatasetDescriptor, Record, Row};

/// Rows per upsert call. Keeps request bodies under the store's payload
/// limit.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Splits a record set into chunks and merges each one on the dataset's
/// conflict key.
///
/// # Failure Model
///
/// A chunk that fails is logged and left out of the returned count. The
/// remaining chunks still run, and chunks that already landed stay
/// landed: there is no transaction across chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertBatcher {
    chunk_size: usize,
}

impl Default for UpsertBatcher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl UpsertBatcher {
    /// Create a batcher with a custom chunk size (minimum 1).
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Merge `records` into `descriptor.table`.
    ///
    /// # Returns
    ///
    /// The number of records in chunks the store accepted. Records that
    /// cannot be turned into rows (non-finite values, missing dimension)
    /// are skipped with a warning and never counted.
    pub async fn upsert<S: Store>(
        &self,
        store: &S,
        descriptor: &DatasetDescriptor,
        records: &[Record],
    ) -> usize {
        let rows: Vec<Row> = records
            .iter()
            .filter_map(|record| match record.to_row(descriptor) {
                Ok(row) => Some(row),
                Err(err) => {
                    tracing::warn!(
                        "Skipping {} record for {}: {}",
                        descriptor.name,
                        record.date,
                        err
                    );
                    None
                }
            })
            .collect();

        if rows.is_empty() {
            return 0;
        }

        let conflict = descriptor.conflict.columns();
        let chunks = rows.len().div_ceil(self.chunk_size);
        let mut saved = 0;

        for (index, chunk) in rows.chunks(self.chunk_size).enumerate() {
            match store.upsert(descriptor.table, chunk, &conflict).await {
                Ok(()) => saved += chunk.len(),
                Err(err) => {
                    tracing::error!(
                        "Upsert chunk {}/{} ({} rows) into {} failed: {}",
                        index + 1,
                        chunks,
                        chunk.len(),
                        descriptor.table,
                        err
                    );
                }
            }
        }

        tracing::debug!(
            "Merged {}/{} rows into {} in {} chunk(s)",
            saved,
            rows.len(),
            descriptor.table,
            chunks
        );
        saved
    }
}
