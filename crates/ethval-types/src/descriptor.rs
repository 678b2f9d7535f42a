//! Dataset descriptors.
//!
//! A [`DatasetDescriptor`] names the table a dataset lands in, how rows
//! collide (the conflict key) and which value columns it carries. They are
//! built once at startup and never change during a run.

/// Columns that identify a row for upsert purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKey {
    /// One row per calendar day.
    Date,
    /// One row per calendar day and dimension value (e.g. `chain`).
    DateAnd(&'static str),
}

impl ConflictKey {
    /// The conflict columns in the order the store expects them.
    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            ConflictKey::Date => vec!["date"],
            ConflictKey::DateAnd(dimension) => vec!["date", dimension],
        }
    }

    /// The secondary dimension column, if any.
    #[inline]
    pub fn dimension(&self) -> Option<&'static str> {
        match self {
            ConflictKey::Date => None,
            ConflictKey::DateAnd(dimension) => Some(dimension),
        }
    }
}

/// Static description of one dataset's storage shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetDescriptor {
    /// Short name used in logs and the run report (e.g. `eth_price`).
    pub name: &'static str,

    /// Target table (e.g. `historical_eth_price`).
    pub table: &'static str,

    /// How rows collide on upsert.
    pub conflict: ConflictKey,

    /// Value columns, excluding `date`, the dimension and `source`.
    pub columns: &'static [&'static str],
}

impl DatasetDescriptor {
    /// Create a date-keyed descriptor.
    pub fn new(name: &'static str, table: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            name,
            table,
            conflict: ConflictKey::Date,
            columns,
        }
    }

    /// Key the table by date plus a dimension column (builder pattern).
    pub fn keyed_by(mut self, dimension: &'static str) -> Self {
        self.conflict = ConflictKey::DateAnd(dimension);
        self
    }
}
