//! Canonical record types.
//!
//! A [`Record`] is the uniform shape every normalizer and synthesizer
//! produces: one calendar day, an optional dimension value (chain or
//! protocol), typed value columns and a provenance tag.

use crate::{DatasetDescriptor, Provenance, TypeError};
use chrono::NaiveDate;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A store row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Identity of a record within its table: `(date, dimension)`.
pub type RecordKey<'a> = (NaiveDate, Option<&'a str>);

/// A typed value column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Floating point value (prices, TVL, ratios).
    Number(f64),
    /// Integer value (counts, epochs).
    Integer(i64),
    /// Text value (classifications).
    Text(String),
    /// Explicitly absent.
    Null,
}

impl FieldValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Text(_) | FieldValue::Null => None,
        }
    }

    /// Returns true if this is [`FieldValue::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn to_json(&self, column: &'static str) -> Result<Value, TypeError> {
        match self {
            FieldValue::Number(v) => Number::from_f64(*v)
                .map(Value::Number)
                .ok_or(TypeError::NonFinite { column }),
            FieldValue::Integer(v) => Ok(Value::from(*v)),
            FieldValue::Text(s) => Ok(Value::String(s.clone())),
            FieldValue::Null => Ok(Value::Null),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Number)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// One canonical, date-keyed row.
///
/// # Invariants
///
/// - `date` has calendar-day granularity (no time of day exists to carry).
/// - `source` is always set.
/// - Numeric columns must be finite by the time the record is written;
///   [`Record::to_row`] refuses NaN and infinities.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Calendar day (UTC).
    pub date: NaiveDate,

    /// Secondary key value (e.g. `Arbitrum`, `lido`) for composite-keyed tables.
    pub dimension: Option<String>,

    /// Value columns.
    pub fields: BTreeMap<&'static str, FieldValue>,

    /// Where the values came from.
    pub source: Provenance,

    /// Columns whose value was filled from a default because the payload
    /// had none. Never persisted.
    pub defaulted: BTreeSet<&'static str>,
}

impl Record {
    /// Create a record with no value columns.
    pub fn new(date: NaiveDate, source: Provenance) -> Self {
        Self {
            date,
            dimension: None,
            fields: BTreeMap::new(),
            source,
            defaulted: BTreeSet::new(),
        }
    }

    /// Set the dimension value (builder pattern).
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    /// Set a value column (builder pattern).
    pub fn with_field(mut self, column: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(column, value.into());
        self
    }

    /// Set a value column in place.
    pub fn set(&mut self, column: &'static str, value: impl Into<FieldValue>) {
        self.fields.insert(column, value.into());
    }

    /// Record that `column` holds a default rather than a measured value.
    pub fn mark_defaulted(&mut self, column: &'static str) {
        self.defaulted.insert(column);
    }

    /// Returns true if `column` was filled from a default.
    #[inline]
    pub fn is_defaulted(&self, column: &str) -> bool {
        self.defaulted.contains(column)
    }

    /// Get a value column.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Numeric value of a column, if present and numeric.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(FieldValue::as_f64)
    }

    /// The record's conflict identity.
    #[inline]
    pub fn key(&self) -> RecordKey<'_> {
        (self.date, self.dimension.as_deref())
    }

    /// Convert to a store row shaped by `descriptor`.
    ///
    /// Every descriptor column is emitted (as `null` when the record lacks
    /// it) so all rows of one batch share the same keys, which the store
    /// needs for a bulk merge. Unknown columns on the record are dropped.
    pub fn to_row(&self, descriptor: &DatasetDescriptor) -> Result<Row, TypeError> {
        let mut row = Map::new();
        row.insert(
            "date".to_string(),
            Value::String(self.date.format("%Y-%m-%d").to_string()),
        );

        if let Some(column) = descriptor.conflict.dimension() {
            let value = self.dimension.as_ref().ok_or(TypeError::MissingDimension {
                table: descriptor.table,
                column,
            })?;
            row.insert(column.to_string(), Value::String(value.clone()));
        }

        for column in descriptor.columns {
            let value = match self.fields.get(column) {
                Some(v) => v.to_json(*column)?,
                None => Value::Null,
            };
            row.insert(column.to_string(), value);
        }

        row.insert("source".to_string(), Value::String(self.source.tag().into_owned()));
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_to_row_emits_all_columns() {
        let descriptor = DatasetDescriptor::new(
            "staking",
            "historical_staking",
            &["total_staked_eth", "total_validators", "avg_apr"],
        );
        let record = Record::new(day(2024, 3, 1), Provenance::Observed("beaconchain"))
            .with_field("total_staked_eth", 31_000_000.0)
            .with_field("total_validators", 968_750i64);

        let row = record.to_row(&descriptor).unwrap();
        assert_eq!(row["date"], "2024-03-01");
        assert_eq!(row["total_staked_eth"], 31_000_000.0);
        assert_eq!(row["total_validators"], 968_750);
        assert!(row["avg_apr"].is_null());
        assert_eq!(row["source"], "beaconchain");
        assert_eq!(row.len(), 5);
    }

    #[test]
    fn test_to_row_with_dimension() {
        let descriptor =
            DatasetDescriptor::new("l2_tvl", "historical_l2_tvl", &["tvl"]).keyed_by("chain");
        let record = Record::new(day(2024, 3, 1), Provenance::Observed("defillama"))
            .with_dimension("Arbitrum")
            .with_field("tvl", 1.5);

        let row = record.to_row(&descriptor).unwrap();
        assert_eq!(row["chain"], "Arbitrum");
    }

    #[test]
    fn test_to_row_missing_dimension() {
        let descriptor =
            DatasetDescriptor::new("l2_tvl", "historical_l2_tvl", &["tvl"]).keyed_by("chain");
        let record = Record::new(day(2024, 3, 1), Provenance::Observed("defillama"));
        assert!(matches!(
            record.to_row(&descriptor),
            Err(TypeError::MissingDimension { column: "chain", .. })
        ));
    }

    #[test]
    fn test_to_row_rejects_nan() {
        let descriptor = DatasetDescriptor::new("nvt", "historical_nvt", &["nvt_ratio"]);
        let record =
            Record::new(day(2024, 3, 1), Provenance::Calculated).with_field("nvt_ratio", f64::NAN);
        assert!(matches!(
            record.to_row(&descriptor),
            Err(TypeError::NonFinite { column: "nvt_ratio" })
        ));
    }

    #[test]
    fn test_defaulted_flag() {
        let mut record = Record::new(day(2024, 3, 1), Provenance::Observed("defillama"))
            .with_field("total_mcap", 0.0);
        assert!(!record.is_defaulted("total_mcap"));
        record.mark_defaulted("total_mcap");
        assert!(record.is_defaulted("total_mcap"));
        assert_eq!(record.number("total_mcap"), Some(0.0));
    }
}
