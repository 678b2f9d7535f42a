//! Payload normalization.
//!
//! Every observed dataset is described by a [`SeriesSpec`]: where the
//! rows live in the payload, how each row is dated, and which columns to
//! pull out of it. [`normalize`] interprets that description. There is no
//! per-provider parsing code.
//!
//! Rows that cannot be dated are skipped and counted; fields that cannot
//! be read fall back to their declared default or to null. Normalization
//! never fails as a whole.

use crate::coerce::{self, DateFormat};
use crate::extract::{self, Path, ROOT};
use chrono::NaiveDate;
use ethval_types::{FieldValue, Precision, Provenance, Record};
use serde_json::Value;

/// Arithmetic applied to a raw number before rounding.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Transform {
    #[default]
    Identity,
    Multiply(f64),
    Divide(f64),
}

impl Transform {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Transform::Identity => value,
            Transform::Multiply(factor) => value * factor,
            Transform::Divide(divisor) => value / divisor,
        }
    }
}

/// Storage type of an extracted column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Float rounded to the given precision.
    Number(Precision),
    /// Integer, truncated toward negative infinity.
    Integer,
    /// Text copied verbatim.
    Text,
}

/// How to fill one value column from a payload row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub column: &'static str,
    /// Candidate key-paths, tried in order. Empty means "always default".
    pub paths: Vec<Path>,
    /// Used (and flagged) when no candidate yields a value.
    pub default: Option<f64>,
    pub kind: FieldKind,
    pub transform: Transform,
}

impl FieldSpec {
    /// A 2dp number read from the first matching path.
    pub fn number(column: &'static str, paths: &[Path]) -> Self {
        Self {
            column,
            paths: paths.to_vec(),
            default: None,
            kind: FieldKind::Number(Precision::Usd),
            transform: Transform::Identity,
        }
    }

    /// An integer read from the first matching path.
    pub fn integer(column: &'static str, paths: &[Path]) -> Self {
        Self {
            kind: FieldKind::Integer,
            ..Self::number(column, paths)
        }
    }

    /// A text value read from the first matching path.
    pub fn text(column: &'static str, paths: &[Path]) -> Self {
        Self {
            kind: FieldKind::Text,
            ..Self::number(column, paths)
        }
    }

    /// A column that is never measured and always holds `value`.
    pub fn constant(column: &'static str, value: f64) -> Self {
        Self {
            default: Some(value),
            ..Self::number(column, &[])
        }
    }

    /// A column that is never measured and stays null.
    pub fn null(column: &'static str) -> Self {
        Self::number(column, &[])
    }

    /// Set the rounding precision (builder pattern).
    pub fn precision(mut self, precision: Precision) -> Self {
        self.kind = FieldKind::Number(precision);
        self
    }

    /// Set the default used when no candidate matches (builder pattern).
    pub fn or_default(mut self, value: f64) -> Self {
        self.default = Some(value);
        self
    }

    /// Multiply the raw value (builder pattern).
    pub fn multiply(mut self, factor: f64) -> Self {
        self.transform = Transform::Multiply(factor);
        self
    }

    /// Divide the raw value (builder pattern).
    pub fn divide(mut self, divisor: f64) -> Self {
        self.transform = Transform::Divide(divisor);
        self
    }

    /// Read this field from `row`.
    ///
    /// Returns the value and whether it came from the default. With
    /// `round` unset, numbers are left unrounded (used before averaging).
    fn read(&self, row: &Value, round: bool) -> (FieldValue, bool) {
        match self.kind {
            FieldKind::Text => match extract::extract_text(row, &self.paths) {
                Some(text) => (FieldValue::Text(text.to_string()), false),
                None => (FieldValue::Null, false),
            },
            FieldKind::Integer | FieldKind::Number(_) => {
                let Some(found) = extract::extract_number(row, &self.paths, self.default) else {
                    return (FieldValue::Null, false);
                };
                let value = self.transform.apply(found.value);
                let stored = match self.kind {
                    FieldKind::Integer if value.is_finite() => {
                        FieldValue::Integer(value.floor() as i64)
                    }
                    FieldKind::Number(precision) if round => precision.round(value).into(),
                    _ if value.is_finite() => FieldValue::Number(value),
                    _ => FieldValue::Null,
                };
                (stored, found.defaulted)
            }
        }
    }
}

/// Where the rows of a payload live.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// The first candidate path that holds an array.
    Array(Vec<Path>),
    /// A single object describing the current state.
    Single(Path),
}

/// How each row is dated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateSource {
    /// A field of the row.
    Field(Path, DateFormat),
    /// The run date (for current-state snapshots).
    RunDate,
}

/// An equality test on a payload node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub path: Path,
    pub equals: &'static str,
}

impl Match {
    /// Strings compare directly; numbers and booleans by their JSON text.
    pub fn matches(&self, value: &Value) -> bool {
        match extract::lookup(value, self.path) {
            Some(Value::String(s)) => s == self.equals,
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string() == self.equals,
            _ => false,
        }
    }
}

/// Rows carry their dimension value in a field; only `allowed` values are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionField {
    pub path: Path,
    pub allowed: &'static [&'static str],
}

/// How rows sharing a day are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    /// One record per row.
    #[default]
    Each,
    /// Numeric columns averaged per day, rounded after averaging.
    DailyMean,
}

/// Declarative description of one payload shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub rows: Rows,
    pub date: DateSource,
    pub fields: Vec<FieldSpec>,
    /// Payload-level conditions; if any fails the payload counts as empty.
    pub guards: Vec<Match>,
    /// Row-level conditions; rows failing any are ignored.
    pub filters: Vec<Match>,
    pub dimension: Option<DimensionField>,
    pub aggregate: Aggregate,
    /// Keep only the last `n` rows of the payload.
    pub keep_last: Option<usize>,
    /// Fewer records than this counts as an empty payload.
    pub min_records: usize,
}

impl SeriesSpec {
    /// Rows are the first array found at one of `paths`.
    pub fn rows_at(paths: &[Path]) -> Self {
        Self {
            rows: Rows::Array(paths.to_vec()),
            date: DateSource::RunDate,
            fields: Vec::new(),
            guards: Vec::new(),
            filters: Vec::new(),
            dimension: None,
            aggregate: Aggregate::Each,
            keep_last: None,
            min_records: 1,
        }
    }

    /// The payload itself is the row array.
    pub fn root_array() -> Self {
        Self::rows_at(&[ROOT])
    }

    /// A single current-state object at `path`, dated with the run date.
    pub fn snapshot(path: Path) -> Self {
        Self {
            rows: Rows::Single(path),
            ..Self::rows_at(&[])
        }
    }

    /// Date each row from the field at `path` (builder pattern).
    pub fn dated(mut self, path: Path, format: DateFormat) -> Self {
        self.date = DateSource::Field(path, format);
        self
    }

    /// Add a value column (builder pattern).
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Require `path == equals` on the payload (builder pattern).
    pub fn guard(mut self, path: Path, equals: &'static str) -> Self {
        self.guards.push(Match { path, equals });
        self
    }

    /// Keep only rows with `path == equals` (builder pattern).
    pub fn filter(mut self, path: Path, equals: &'static str) -> Self {
        self.filters.push(Match { path, equals });
        self
    }

    /// Take each row's dimension from `path`, keeping `allowed` values (builder pattern).
    pub fn dimension_from(mut self, path: Path, allowed: &'static [&'static str]) -> Self {
        self.dimension = Some(DimensionField { path, allowed });
        self
    }

    /// Average rows per day (builder pattern).
    pub fn daily_mean(mut self) -> Self {
        self.aggregate = Aggregate::DailyMean;
        self
    }

    /// Keep only the last `n` rows (builder pattern).
    pub fn keep_last(mut self, n: usize) -> Self {
        self.keep_last = Some(n);
        self
    }

    /// Treat fewer than `n` records as empty (builder pattern).
    pub fn min_records(mut self, n: usize) -> Self {
        self.min_records = n;
        self
    }

    fn collect_rows<'v>(&self, payload: &'v Value) -> Vec<&'v Value> {
        match &self.rows {
            Rows::Array(paths) => paths
                .iter()
                .filter_map(|path| extract::lookup(payload, path))
                .find_map(Value::as_array)
                .map(|rows| rows.iter().collect())
                .unwrap_or_default(),
            Rows::Single(path) => extract::lookup(payload, path)
                .filter(|v| v.is_object())
                .into_iter()
                .collect(),
        }
    }
}

/// Per-call inputs that are not part of the payload shape.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub run_date: NaiveDate,
    /// Dimension value for per-dimension fetches.
    pub dimension: Option<&'a str>,
    pub provenance: Provenance,
}

/// Turn `payload` into records as described by `series`.
///
/// Returns an empty vector when a guard fails, the rows cannot be found,
/// or fewer than `series.min_records` records come out.
pub fn normalize(payload: &Value, series: &SeriesSpec, ctx: &NormalizeContext<'_>) -> Vec<Record> {
    if !series.guards.iter().all(|g| g.matches(payload)) {
        tracing::debug!("Payload failed a guard, treating as empty");
        return Vec::new();
    }

    let mut rows = series.collect_rows(payload);
    if let Some(n) = series.keep_last {
        let skip = rows.len().saturating_sub(n);
        rows.drain(..skip);
    }

    let round = series.aggregate == Aggregate::Each;
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;

    for row in rows {
        if !series.filters.iter().all(|f| f.matches(row)) {
            continue;
        }

        let dimension = match (&series.dimension, ctx.dimension) {
            (Some(field), _) => match extract::lookup(row, field.path).and_then(Value::as_str) {
                Some(value) if field.allowed.contains(&value) => Some(value),
                _ => continue,
            },
            (None, dimension) => dimension,
        };

        let date = match series.date {
            DateSource::Field(path, format) => {
                extract::lookup(row, path).and_then(|v| coerce::to_day(v, format))
            }
            DateSource::RunDate => Some(ctx.run_date),
        };
        let Some(date) = date else {
            skipped += 1;
            continue;
        };

        let mut record = Record::new(date, ctx.provenance);
        if let Some(dimension) = dimension {
            record = record.with_dimension(dimension);
        }
        for field in &series.fields {
            let (value, defaulted) = field.read(row, round);
            record.set(field.column, value);
            if defaulted {
                record.mark_defaulted(field.column);
            }
        }
        records.push(record);
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} undatable rows", skipped);
    }

    if series.aggregate == Aggregate::DailyMean {
        records = daily_mean(records, &series.fields);
    }

    if records.len() < series.min_records {
        tracing::debug!(
            "Only {} records, need {}; treating payload as empty",
            records.len(),
            series.min_records
        );
        return Vec::new();
    }
    records
}

/// Collapse records sharing `(date, dimension)` by averaging numeric
/// columns, then round. Groups keep first-seen order.
fn daily_mean(records: Vec<Record>, fields: &[FieldSpec]) -> Vec<Record> {
    let mut groups: Vec<(Record, Vec<Vec<f64>>)> = Vec::new();

    for record in records {
        let position = groups
            .iter()
            .position(|(first, _)| first.key() == record.key());
        let index = match position {
            Some(index) => index,
            None => {
                groups.push((record.clone(), vec![Vec::new(); fields.len()]));
                groups.len() - 1
            }
        };
        let (_, samples) = &mut groups[index];
        for (slot, field) in samples.iter_mut().zip(fields) {
            if let Some(value) = record.number(field.column) {
                slot.push(value);
            }
        }
    }

    groups
        .into_iter()
        .map(|(mut record, samples)| {
            for (field, values) in fields.iter().zip(samples) {
                let FieldKind::Number(precision) = field.kind else {
                    continue;
                };
                let mean = if values.is_empty() {
                    None
                } else {
                    precision.round(values.iter().sum::<f64>() / values.len() as f64)
                };
                record.set(field.column, mean);
            }
            record
        })
        .collect()
}
