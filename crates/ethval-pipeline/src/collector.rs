//! Collection driver.
//!
//! The [`Collector`] runs tasks one after another: fetch and normalize the
//! primary source, fall back to a derivation or estimate when that yields
//! nothing, filter, then merge through the upsert batcher. A task that
//! errors reports zero and the run continues.

use crate::datasets;
use crate::error::PipelineError;
use crate::fallback::{self, Derivation, Observation};
use crate::normalize::{normalize, NormalizeContext};
use crate::report::{Origin, RunReport, TaskOutcome};
use crate::task::{Augment, Fallback, Fetch, Pacing, Source, Task};
use crate::{coerce, extract};
use chrono::{NaiveDate, Utc};
use ethval_ingestion::{Fetcher, HttpClient};
use ethval_store::{Query, Store, UpsertBatcher};
use ethval_types::{Provenance, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Configuration for the collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Pause after each task.
    pub task_pause: Duration,

    /// Pause after a task whose provider rate-limits aggressively.
    pub rate_limit_pause: Duration,

    /// Pause before each per-dimension fetch.
    pub dimension_pause: Duration,

    /// Enables gas utilization enrichment.
    pub etherscan_api_key: Option<String>,

    /// Fixed run date; today (UTC) when unset.
    pub run_date: Option<NaiveDate>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            task_pause: Duration::from_millis(500),
            rate_limit_pause: Duration::from_millis(2000),
            dimension_pause: Duration::from_millis(300),
            etherscan_api_key: None,
            run_date: None,
        }
    }
}

impl CollectorConfig {
    /// Defaults plus `ETHERSCAN_API_KEY` from the environment.
    pub fn from_env() -> Self {
        let etherscan_api_key = std::env::var("ETHERSCAN_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            etherscan_api_key,
            ..Self::default()
        }
    }

    /// Set the Etherscan API key.
    pub fn with_etherscan_key(mut self, key: &str) -> Self {
        self.etherscan_api_key = Some(key.to_string());
        self
    }

    /// Pin the run date.
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = Some(run_date);
        self
    }

    /// Set the pauses between tasks, after rate-limited tasks and between
    /// dimension fetches.
    pub fn with_pauses(mut self, task: Duration, rate_limited: Duration, dimension: Duration) -> Self {
        self.task_pause = task;
        self.rate_limit_pause = rate_limited;
        self.dimension_pause = dimension;
        self
    }

    /// No pauses at all.
    pub fn without_pauses(self) -> Self {
        self.with_pauses(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    fn pause_after(&self, pacing: Pacing) -> Duration {
        match pacing {
            Pacing::Standard => self.task_pause,
            Pacing::RateLimited => self.rate_limit_pause,
        }
    }
}

/// Runs collection tasks against an HTTP client and a store.
///
/// # Example
///
/// ```rust,no_run
/// use ethval_ingestion::{FetchPolicy, Fetcher, ReqwestClient};
/// use ethval_pipeline::{datasets, Collector, CollectorConfig};
/// use ethval_store::{PostgrestStore, StoreConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = Fetcher::new(ReqwestClient::new()?, FetchPolicy::from_env());
///     let store = PostgrestStore::new(&StoreConfig::from_env()?)?;
///     let collector = Collector::new(fetcher, store, CollectorConfig::from_env());
///
///     let report = collector.run(&datasets::all()).await;
///     println!("{report}");
///     Ok(())
/// }
/// ```
pub struct Collector<C, S> {
    fetcher: Fetcher<C>,
    store: S,
    batcher: UpsertBatcher,
    config: CollectorConfig,
}

impl<C: HttpClient, S: Store> Collector<C, S> {
    pub fn new(fetcher: Fetcher<C>, store: S, config: CollectorConfig) -> Self {
        Self {
            fetcher,
            store,
            batcher: UpsertBatcher::default(),
            config,
        }
    }

    /// Use a different upsert batcher (builder pattern).
    pub fn with_batcher(mut self, batcher: UpsertBatcher) -> Self {
        self.batcher = batcher;
        self
    }

    /// The date this run is stamped with.
    pub fn run_date(&self) -> NaiveDate {
        self.config
            .run_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Run `tasks` in order and report every outcome.
    pub async fn run(&self, tasks: &[Task]) -> RunReport {
        let run_date = self.run_date();
        let total = tasks.len();
        let mut report = RunReport::new(run_date);

        for (index, task) in tasks.iter().enumerate() {
            tracing::info!("[{}/{}] {}", index + 1, total, task.name());
            report = report.with(self.run_task(task, run_date).await);

            if index + 1 < total {
                tokio::time::sleep(self.config.pause_after(task.pacing)).await;
            }
        }

        report
    }

    /// Run one task. Errors are logged and reported as a zero outcome.
    pub async fn run_task(&self, task: &Task, run_date: NaiveDate) -> TaskOutcome {
        match self.try_run_task(task, run_date).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("{} failed: {}", task.name(), err);
                TaskOutcome::failed(task.name(), err)
            }
        }
    }

    async fn try_run_task(&self, task: &Task, run_date: NaiveDate) -> Result<TaskOutcome, PipelineError> {
        let name = task.name();
        let mut origin = Origin::Primary;

        let mut records = match &task.source {
            Some(source) => self.collect(source, run_date).await?,
            None => Vec::new(),
        };

        if records.is_empty() {
            match (&task.fallback, &task.source) {
                (Some(fallback), source) => {
                    if source.is_some() {
                        tracing::warn!("{}: primary source yielded nothing, falling back", name);
                    }
                    records = self.synthesize(task, fallback, run_date).await?;
                    origin = Origin::Fallback;
                }
                (None, None) => {
                    tracing::warn!("{}: no public source available", name);
                    return Ok(TaskOutcome::unavailable(name));
                }
                (None, Some(_)) => tracing::warn!("{}: no data this run", name),
            }
        }

        let (kept, stats) = task.rules.apply(records, run_date);
        if stats.dropped() > 0 {
            tracing::debug!("{}: {}", name, stats);
        }

        let merged = self.batcher.upsert(&self.store, &task.descriptor, &kept).await;
        tracing::info!("{}: merged {} records ({})", name, merged, origin);
        Ok(TaskOutcome::new(name, origin, merged, stats))
    }

    /// Fetch and normalize the primary source.
    async fn collect(&self, source: &Source, run_date: NaiveDate) -> Result<Vec<Record>, PipelineError> {
        let mut records = match source.fetch {
            Fetch::Single(url) => match self.fetcher.fetch(url).await {
                Some(payload) => normalize(
                    &payload,
                    &source.series,
                    &NormalizeContext {
                        run_date,
                        dimension: None,
                        provenance: source.provenance,
                    },
                ),
                None => Vec::new(),
            },
            Fetch::PerDimension { base, query, values } => {
                let mut all = Vec::new();
                for &value in values {
                    tokio::time::sleep(self.config.dimension_pause).await;
                    let url = dimension_url(base, value, query)?;
                    let Some(payload) = self.fetcher.fetch(url.as_str()).await else {
                        tracing::warn!("  {}: no data", value);
                        continue;
                    };
                    let records = normalize(
                        &payload,
                        &source.series,
                        &NormalizeContext {
                            run_date,
                            dimension: Some(value),
                            provenance: source.provenance,
                        },
                    );
                    tracing::info!("  {}: {}", value, records.len());
                    all.extend(records);
                }
                all
            }
        };

        if let Some(augment) = &source.augment {
            if !records.is_empty() {
                self.augment(&mut records, augment, run_date).await;
            }
        }
        Ok(records)
    }

    /// Fill `augment.column` on the run date's record, if there is one.
    async fn augment(&self, records: &mut [Record], augment: &Augment, run_date: NaiveDate) {
        let Some(target) = records.iter_mut().find(|r| r.date == run_date) else {
            return;
        };
        let Some(payload) = self.fetcher.fetch(augment.url).await else {
            return;
        };
        let value = extract::lookup(&payload, augment.path)
            .and_then(coerce::number)
            .and_then(|v| augment.precision.round(v));
        if let Some(value) = value {
            target.set(augment.column, value);
        }
    }

    async fn synthesize(
        &self,
        task: &Task,
        fallback: &Fallback,
        run_date: NaiveDate,
    ) -> Result<Vec<Record>, PipelineError> {
        let records = match fallback {
            Fallback::Estimate(model) => model.generate(run_date),
            Fallback::Derive(derivation) => self.derive(task, *derivation, run_date).await?,
        };
        tracing::info!("{}: synthesized {} records", task.name(), records.len());
        Ok(records)
    }

    async fn derive(
        &self,
        task: &Task,
        derivation: Derivation,
        run_date: NaiveDate,
    ) -> Result<Vec<Record>, PipelineError> {
        Ok(match derivation {
            Derivation::Volatility { prices, window } => {
                fallback::rolling_volatility(&self.history(prices, "close", None).await?, window)
            }
            Derivation::FearGreed { prices, lookback } => {
                fallback::fear_greed_from_prices(&self.history(prices, "close", None).await?, lookback)
            }
            Derivation::Nvt { prices, supply } => {
                let rows = self
                    .store
                    .select(&Query::table(prices).columns(&["date", "close", "volume"]).order_asc("date"))
                    .await?;
                fallback::nvt(&fallback::price_bars(&rows), supply)
            }
            Derivation::GasBurn {
                fees,
                prices,
                burn_share,
                first_day,
            } => {
                let Some((from, to)) = self.burn_window(task, first_day, run_date).await? else {
                    tracing::info!("{}: already up to date", task.name());
                    return Ok(Vec::new());
                };
                tracing::info!("{}: filling {} to {}", task.name(), from, to);
                let utilization = self.utilization(from, to, run_date).await;
                let fees = self.history(fees, "fees", None).await?;
                let closes = self.history(prices, "close", None).await?;
                fallback::eth_burnt(&fees, &closes, &utilization, from, to, burn_share)
            }
            Derivation::Scaled {
                from,
                from_column,
                column,
                factor,
            } => {
                let dimension = task.descriptor.conflict.dimension();
                fallback::scaled(&self.history(from, from_column, dimension).await?, column, factor)
            }
            Derivation::EthInDefi {
                tvl,
                prices,
                share,
                fallback_price,
            } => {
                let tvl = self.history(tvl, "tvl", None).await?;
                let closes = self.history(prices, "close", None).await?;
                fallback::eth_in_defi(&tvl, &closes, share, fallback_price)
            }
        })
    }

    /// Stored `column` of `table`, oldest first.
    async fn history(
        &self,
        table: &str,
        column: &str,
        dimension: Option<&str>,
    ) -> Result<Vec<Observation>, PipelineError> {
        let mut columns = vec!["date", column];
        columns.extend(dimension);
        let rows = self
            .store
            .select(&Query::table(table).columns(&columns).order_asc("date"))
            .await?;
        Ok(fallback::observations(&rows, column, dimension))
    }

    /// Days still missing from the gas burn table: the day after the last
    /// stored one (or `first_day` when empty) through yesterday.
    async fn burn_window(
        &self,
        task: &Task,
        first_day: NaiveDate,
        run_date: NaiveDate,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, PipelineError> {
        let latest = self
            .store
            .select(
                &Query::table(task.descriptor.table)
                    .columns(&["date"])
                    .order_desc("date")
                    .limit(1),
            )
            .await?;
        let from = latest
            .first()
            .and_then(|row| row.get("date"))
            .and_then(Value::as_str)
            .and_then(coerce::day_from_iso)
            .map_or(Some(first_day), |last| last.succ_opt());
        let to = run_date.pred_opt();

        Ok(match (from, to) {
            (Some(from), Some(to)) if from <= to => Some((from, to)),
            _ => None,
        })
    }

    /// Etherscan daily utilization (percent) for `[from, to]`. Empty when
    /// no key is configured or the request fails.
    async fn utilization(&self, from: NaiveDate, to: NaiveDate, run_date: NaiveDate) -> HashMap<NaiveDate, f64> {
        let Some(key) = &self.config.etherscan_api_key else {
            tracing::warn!("ETHERSCAN_API_KEY not set, skipping gas utilization");
            return HashMap::new();
        };
        let url = match datasets::etherscan_utilization_url(from, to, key) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!("Bad Etherscan URL: {}", err);
                return HashMap::new();
            }
        };
        let Some(payload) = self.fetcher.fetch(url.as_str()).await else {
            return HashMap::new();
        };

        let records = normalize(
            &payload,
            &datasets::etherscan_utilization(),
            &NormalizeContext {
                run_date,
                dimension: None,
                provenance: Provenance::Observed("etherscan"),
            },
        );
        tracing::info!("Got {} days of gas utilization", records.len());
        records
            .iter()
            .filter_map(|r| Some((r.date, r.number("gas_utilization")?)))
            .collect()
    }
}

/// `base` with `value` appended as one percent-encoded path segment.
fn dimension_url(base: &str, value: &str, query: Option<&str>) -> Result<Url, PipelineError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| PipelineError::NotABase(base.to_string()))?
        .pop_if_empty()
        .push(value);
    url.set_query(query);
    Ok(url)
}
