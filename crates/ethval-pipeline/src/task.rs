//! Collection task descriptors.
//!
//! A [`Task`] is pure data: what to fetch, how to read it, what to do
//! when it yields nothing, and which quality rules apply. The collector
//! interprets tasks; adding a dataset means adding a table entry, not code.

use crate::extract::Path;
use crate::fallback::{Derivation, TrendSpec};
use crate::filter::FilterRules;
use crate::normalize::SeriesSpec;
use ethval_types::{DatasetDescriptor, Precision, Provenance};

/// Which URLs a source is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// One request.
    Single(&'static str),
    /// One request per dimension value, appended to `base` as a path
    /// segment, with an optional query string.
    PerDimension {
        base: &'static str,
        query: Option<&'static str>,
        values: &'static [&'static str],
    },
}

/// A second request that fills one column of the run date's record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Augment {
    pub url: &'static str,
    pub path: Path,
    pub column: &'static str,
    pub precision: Precision,
}

/// Primary source of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub fetch: Fetch,
    pub series: SeriesSpec,
    pub provenance: Provenance,
    pub augment: Option<Augment>,
}

impl Source {
    /// Values observed at `url`, tagged with `provider`.
    pub fn observed(provider: &'static str, url: &'static str, series: SeriesSpec) -> Self {
        Self {
            fetch: Fetch::Single(url),
            series,
            provenance: Provenance::Observed(provider),
            augment: None,
        }
    }

    /// Values observed once per dimension value.
    pub fn per_dimension(
        provider: &'static str,
        base: &'static str,
        query: Option<&'static str>,
        values: &'static [&'static str],
        series: SeriesSpec,
    ) -> Self {
        Self {
            fetch: Fetch::PerDimension {
                base,
                query,
                values,
            },
            ..Self::observed(provider, base, series)
        }
    }

    /// Tag records as a scaled proxy of `provider` instead (builder pattern).
    pub fn scaled_proxy(mut self) -> Self {
        if let Provenance::Observed(provider) = self.provenance {
            self.provenance = Provenance::ScaledProxy(provider);
        }
        self
    }

    /// Fill a column of the run date's record from another URL (builder pattern).
    pub fn augment(mut self, augment: Augment) -> Self {
        self.augment = Some(augment);
        self
    }
}

/// What to do when the primary source yields nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    Derive(Derivation),
    Estimate(TrendSpec),
}

/// Pause policy after a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    #[default]
    Standard,
    /// The provider rate-limits aggressively; wait longer before the next task.
    RateLimited,
}

/// One dataset's collection task.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub descriptor: DatasetDescriptor,
    /// `None` when no free public source exists.
    pub source: Option<Source>,
    pub fallback: Option<Fallback>,
    pub rules: FilterRules,
    pub pacing: Pacing,
}

impl Task {
    /// A task with no source, no fallback and no rules.
    pub fn new(descriptor: DatasetDescriptor) -> Self {
        Self {
            descriptor,
            source: None,
            fallback: None,
            rules: FilterRules::new(),
            pacing: Pacing::Standard,
        }
    }

    /// Dataset name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Set the primary source (builder pattern).
    pub fn source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    /// Derive from stored datasets when the source yields nothing (builder pattern).
    pub fn derive(mut self, derivation: Derivation) -> Self {
        self.fallback = Some(Fallback::Derive(derivation));
        self
    }

    /// Estimate from a trend model when the source yields nothing (builder pattern).
    pub fn estimate(mut self, model: TrendSpec) -> Self {
        self.fallback = Some(Fallback::Estimate(model));
        self
    }

    /// Set the quality rules (builder pattern).
    pub fn rules(mut self, rules: FilterRules) -> Self {
        self.rules = rules;
        self
    }

    /// Pause longer after this task (builder pattern).
    pub fn rate_limited(mut self) -> Self {
        self.pacing = Pacing::RateLimited;
        self
    }
}
