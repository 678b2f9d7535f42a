//! Data-quality filter.
//!
//! Each dataset composes a [`FilterRules`] from a handful of primitives.
//! Rules drop records; they never clamp or repair values. Application
//! order is fixed:
//!
//! 1. pointwise value rules ([`Rule::Range`], [`Rule::Positive`]) in the
//!    order declared,
//! 2. [`Rule::MaxDailyChange`], which sorts by date and compares each
//!    candidate against the last *accepted* value,
//! 3. [`Rule::Recency`],
//! 4. deduplication by conflict key, last record in input order wins.

use chrono::{Days, NaiveDate};
use ethval_types::Record;
use std::collections::HashMap;
use std::fmt;

/// One validity rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Value present and within `[min, max]`.
    Range {
        column: &'static str,
        min: f64,
        max: f64,
    },
    /// Value present, measured (not defaulted) and strictly positive.
    Positive { column: &'static str },
    /// Relative change against the previous accepted value at most `max_pct` percent.
    MaxDailyChange { column: &'static str, max_pct: f64 },
    /// Date no older than `days` before the run date.
    Recency { days: u64 },
}

/// Counts of what a filter pass dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub input: usize,
    pub out_of_range: usize,
    pub non_positive: usize,
    pub abrupt: usize,
    pub stale: usize,
    pub duplicates: usize,
}

impl FilterStats {
    /// Records that survived.
    pub fn kept(&self) -> usize {
        self.input
            - self.out_of_range
            - self.non_positive
            - self.abrupt
            - self.stale
            - self.duplicates
    }

    /// Total records dropped.
    pub fn dropped(&self) -> usize {
        self.input - self.kept()
    }
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in, {} kept (range {}, positivity {}, delta {}, stale {}, duplicate {})",
            self.input,
            self.kept(),
            self.out_of_range,
            self.non_positive,
            self.abrupt,
            self.stale,
            self.duplicates
        )
    }
}

/// An ordered composition of [`Rule`]s for one dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRules {
    rules: Vec<Rule>,
}

impl FilterRules {
    /// No rules; only deduplication applies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column` within `[min, max]` (builder pattern).
    pub fn range(mut self, column: &'static str, min: f64, max: f64) -> Self {
        self.rules.push(Rule::Range { column, min, max });
        self
    }

    /// Require `column` to be strictly positive (builder pattern).
    pub fn positive(mut self, column: &'static str) -> Self {
        self.rules.push(Rule::Positive { column });
        self
    }

    /// Reject day-over-day moves above `max_pct` percent (builder pattern).
    pub fn max_daily_change(mut self, column: &'static str, max_pct: f64) -> Self {
        self.rules.push(Rule::MaxDailyChange { column, max_pct });
        self
    }

    /// Keep only the last `days` days (builder pattern).
    pub fn recency(mut self, days: u64) -> Self {
        self.rules.push(Rule::Recency { days });
        self
    }

    /// Apply the rules to `records` for a run on `run_date`.
    pub fn apply(&self, records: Vec<Record>, run_date: NaiveDate) -> (Vec<Record>, FilterStats) {
        let mut stats = FilterStats {
            input: records.len(),
            ..FilterStats::default()
        };

        let mut records: Vec<Record> = records
            .into_iter()
            .filter(|record| self.pointwise(record, &mut stats))
            .collect();

        for rule in &self.rules {
            if let Rule::MaxDailyChange { column, max_pct } = *rule {
                records = max_daily_change(records, column, max_pct, &mut stats);
            }
        }

        for rule in &self.rules {
            if let Rule::Recency { days } = *rule {
                let cutoff = run_date.checked_sub_days(Days::new(days));
                records.retain(|record| {
                    let fresh = cutoff.map_or(true, |cutoff| record.date >= cutoff);
                    if !fresh {
                        stats.stale += 1;
                    }
                    fresh
                });
            }
        }

        let records = dedup(records, &mut stats);
        (records, stats)
    }

    fn pointwise(&self, record: &Record, stats: &mut FilterStats) -> bool {
        for rule in &self.rules {
            match *rule {
                Rule::Range { column, min, max } => {
                    let value = record.number(column);
                    if !value.is_some_and(|v| (min..=max).contains(&v)) {
                        tracing::debug!(
                            "Skip {}: {} = {:?} outside [{}, {}]",
                            record.date,
                            column,
                            value,
                            min,
                            max
                        );
                        stats.out_of_range += 1;
                        return false;
                    }
                }
                Rule::Positive { column } => {
                    let measured = !record.is_defaulted(column);
                    if !(measured && record.number(column).is_some_and(|v| v > 0.0)) {
                        stats.non_positive += 1;
                        return false;
                    }
                }
                Rule::MaxDailyChange { .. } | Rule::Recency { .. } => {}
            }
        }
        true
    }
}

/// Stable-sort by date, then drop any record that moves more than
/// `max_pct` percent from the last accepted value of its dimension.
/// Rejected records never become the baseline.
fn max_daily_change(
    mut records: Vec<Record>,
    column: &'static str,
    max_pct: f64,
    stats: &mut FilterStats,
) -> Vec<Record> {
    records.sort_by_key(|record| record.date);

    let mut baseline: HashMap<Option<String>, f64> = HashMap::new();
    records
        .into_iter()
        .filter(|record| {
            let Some(value) = record.number(column) else {
                return true;
            };
            let previous = baseline.get(&record.dimension).copied();
            if let Some(previous) = previous.filter(|p| *p != 0.0) {
                let change = ((value - previous) / previous * 100.0).abs();
                if change > max_pct {
                    tracing::debug!(
                        "Skip {}: {:.2}% daily change in {}",
                        record.date,
                        change,
                        column
                    );
                    stats.abrupt += 1;
                    return false;
                }
            }
            baseline.insert(record.dimension.clone(), value);
            true
        })
        .collect()
}

/// Collapse records sharing a conflict key. The last record in input
/// order wins and takes the position of the first.
fn dedup(records: Vec<Record>, stats: &mut FilterStats) -> Vec<Record> {
    let mut positions: HashMap<(NaiveDate, Option<String>), usize> = HashMap::new();
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.date, record.dimension.clone());
        match positions.get(&key) {
            Some(&index) => {
                unique[index] = record;
                stats.duplicates += 1;
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }
    unique
}
