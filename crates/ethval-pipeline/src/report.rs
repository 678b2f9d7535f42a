//! Run report.
//!
//! Each task produces an immutable [`TaskOutcome`]; the collector folds
//! them into a [`RunReport`] keyed by dataset name.

use crate::filter::FilterStats;
use chrono::NaiveDate;
use std::fmt;

/// Which path produced a task's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The primary source.
    Primary,
    /// A derivation or trend estimate.
    Fallback,
    /// Nothing: no source and no fallback exist.
    Unavailable,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Primary => "primary",
            Origin::Fallback => "fallback",
            Origin::Unavailable => "unavailable",
        })
    }
}

/// Result of one collection task.
///
/// `merged == 0` means either "nothing new" or "source unavailable"; the
/// two are not told apart here.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub name: &'static str,
    pub origin: Origin,
    pub merged: usize,
    pub filter: FilterStats,
    pub error: Option<String>,
}

impl TaskOutcome {
    /// A task that ran to completion.
    pub fn new(name: &'static str, origin: Origin, merged: usize, filter: FilterStats) -> Self {
        Self {
            name,
            origin,
            merged,
            filter,
            error: None,
        }
    }

    /// A dataset with nothing to collect.
    pub fn unavailable(name: &'static str) -> Self {
        Self::new(name, Origin::Unavailable, 0, FilterStats::default())
    }

    /// A task that hit an error.
    pub fn failed(name: &'static str, error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(name, Origin::Primary, 0, FilterStats::default())
        }
    }

    /// Returns true if any record was merged.
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.merged > 0
    }
}

/// Outcomes of one run, in task order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_date: NaiveDate,
    outcomes: Vec<TaskOutcome>,
}

impl RunReport {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            outcomes: Vec::new(),
        }
    }

    /// Fold in an outcome, replacing any earlier one for the same dataset.
    pub fn with(mut self, outcome: TaskOutcome) -> Self {
        match self.outcomes.iter_mut().find(|o| o.name == outcome.name) {
            Some(existing) => *existing = outcome,
            None => self.outcomes.push(outcome),
        }
        self
    }

    /// Outcome for a dataset.
    pub fn get(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Number of datasets that merged at least one record.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Number of datasets that merged nothing.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Records merged across all datasets.
    pub fn total_merged(&self) -> usize {
        self.outcomes.iter().map(|o| o.merged).sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "COLLECTION SUMMARY ({})", self.run_date)?;
        writeln!(f, "{rule}")?;
        for outcome in &self.outcomes {
            let status = if outcome.succeeded() { "ok  " } else { "fail" };
            write!(f, "[{status}] {:<20} {:>6}", outcome.name, outcome.merged)?;
            match (&outcome.error, outcome.origin) {
                (Some(error), _) => write!(f, "  error: {error}")?,
                (None, Origin::Fallback) => write!(f, "  (fallback)")?,
                (None, Origin::Unavailable) => write!(f, "  (no source)")?,
                (None, Origin::Primary) => {}
            }
            writeln!(f)?;
        }
        writeln!(f, "{rule}")?;
        let total = self.outcomes.len();
        write!(
            f,
            "Success: {}/{} | Failed: {}/{} | Records: {}",
            self.succeeded(),
            total,
            self.failed(),
            total,
            self.total_merged()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_fold_and_counts() {
        let report = RunReport::new(run_date())
            .with(TaskOutcome::new("eth_price", Origin::Primary, 1000, FilterStats::default()))
            .with(TaskOutcome::unavailable("blob_data"))
            .with(TaskOutcome::failed("nvt", "store error: boom"));

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.total_merged(), 1000);
        assert_eq!(report.get("nvt").unwrap().error.as_deref(), Some("store error: boom"));
    }

    #[test]
    fn test_same_name_replaces() {
        let report = RunReport::new(run_date())
            .with(TaskOutcome::unavailable("eth_price"))
            .with(TaskOutcome::new("eth_price", Origin::Primary, 5, FilterStats::default()));
        assert_eq!(report.outcomes().len(), 1);
        assert_eq!(report.get("eth_price").unwrap().merged, 5);
    }

    #[test]
    fn test_display_summary() {
        let report = RunReport::new(run_date())
            .with(TaskOutcome::new("volatility", Origin::Fallback, 42, FilterStats::default()))
            .with(TaskOutcome::unavailable("blob_data"));
        let text = report.to_string();
        assert!(text.contains("COLLECTION SUMMARY (2024-03-10)"));
        assert!(text.contains("[ok  ] volatility               42  (fallback)"));
        assert!(text.contains("[fail] blob_data                 0  (no source)"));
        assert!(text.ends_with("Success: 1/2 | Failed: 1/2 | Records: 42"));
    }
}
