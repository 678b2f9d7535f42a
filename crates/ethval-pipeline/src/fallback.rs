//! Fallback synthesis.
//!
//! When a dataset has no usable primary source, records are either
//! derived from datasets already in the store ([`Derivation`]) or
//! generated from a deterministic trend model ([`TrendSpec`]). All output
//! is tagged [`Provenance::Calculated`] or [`Provenance::Estimated`] and
//! goes through the dataset's quality filter like observed data.
//!
//! The functions here are pure. Loading inputs from the store happens in
//! the collector.

use crate::coerce;
use chrono::{Days, NaiveDate};
use ethval_types::{Precision, Provenance, Record, Row};
use serde_json::Value;
use std::collections::HashMap;

/// One stored value of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub dimension: Option<String>,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self {
            date,
            dimension: None,
            value,
        }
    }
}

/// A stored daily price bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: Option<f64>,
}

fn row_date(row: &Row) -> Option<NaiveDate> {
    row.get("date").and_then(Value::as_str).and_then(coerce::day_from_iso)
}

/// Read `column` (and the `dimension` column, when given) out of stored
/// rows. Rows without a date, a numeric value or the dimension are skipped.
pub fn observations(rows: &[Row], column: &str, dimension: Option<&str>) -> Vec<Observation> {
    rows.iter()
        .filter_map(|row| {
            let date = row_date(row)?;
            let value = row.get(column).and_then(coerce::number)?;
            let dimension = match dimension {
                Some(c) => Some(row.get(c)?.as_str()?.to_string()),
                None => None,
            };
            Some(Observation {
                date,
                dimension,
                value,
            })
        })
        .collect()
}

/// Read `close` and `volume` out of stored price rows.
pub fn price_bars(rows: &[Row]) -> Vec<PriceBar> {
    rows.iter()
        .filter_map(|row| {
            Some(PriceBar {
                date: row_date(row)?,
                close: row.get("close").and_then(coerce::number)?,
                volume: row.get("volume").and_then(coerce::number),
            })
        })
        .collect()
}

/// How to compute a dataset from stored ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derivation {
    /// Rolling annualized volatility of closing prices, in percent.
    Volatility {
        prices: &'static str,
        window: usize,
    },
    /// Sentiment index mapped from the price change over `lookback` days.
    FearGreed {
        prices: &'static str,
        lookback: usize,
    },
    /// Network value to transactions from price and volume.
    Nvt { prices: &'static str, supply: f64 },
    /// ETH burnt from protocol fees and price, filled incrementally up to
    /// yesterday. `first_day` is the first day filled when the target table
    /// is empty.
    GasBurn {
        fees: &'static str,
        prices: &'static str,
        burn_share: f64,
        first_day: NaiveDate,
    },
    /// Another table's column multiplied by `factor` and floored.
    Scaled {
        from: &'static str,
        from_column: &'static str,
        column: &'static str,
        factor: f64,
    },
    /// ETH locked in DeFi from USD TVL and price.
    EthInDefi {
        tvl: &'static str,
        prices: &'static str,
        share: f64,
        fallback_price: f64,
    },
}

/// 30-day style rolling volatility.
///
/// For each index `i >= window`, takes the `window` closes before `i`,
/// computes their log returns and the population standard deviation, and
/// annualizes with `sqrt(365)`. The record is dated `closes[i].date`.
pub fn rolling_volatility(closes: &[Observation], window: usize) -> Vec<Record> {
    if window < 2 {
        return Vec::new();
    }

    (window..closes.len())
        .filter_map(|i| {
            let returns: Vec<f64> = closes[i - window..i]
                .windows(2)
                .map(|pair| (pair[1].value / pair[0].value).ln())
                .collect();
            let n = returns.len() as f64;
            let mean = returns.iter().sum::<f64>() / n;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
            let volatility = (variance * 365.0).sqrt() * 100.0;
            volatility.is_finite().then(|| {
                Record::new(closes[i].date, Provenance::Calculated)
                    .with_field("volatility_30d", Precision::Usd.round(volatility))
            })
        })
        .collect()
}

/// Sentiment index for a percentage price change.
///
/// Piecewise linear, clamped to `5..=95`. Crashes beyond -30% map to the
/// fixed value 15.
pub fn fear_greed_value(change_pct: f64) -> i64 {
    let c = change_pct;
    let value = if c < -30.0 {
        15.0
    } else if c < -15.0 {
        20.0 + (c + 30.0) / 15.0 * 20.0
    } else if c < -5.0 {
        40.0 + (c + 15.0) / 10.0 * 10.0
    } else if c < 5.0 {
        45.0 + (c + 5.0) / 10.0 * 10.0
    } else if c < 15.0 {
        55.0 + (c - 5.0) / 10.0 * 10.0
    } else if c < 30.0 {
        65.0 + (c - 15.0) / 15.0 * 15.0
    } else {
        80.0 + ((c - 30.0) / 20.0 * 15.0).min(15.0)
    };
    (value.round() as i64).clamp(5, 95)
}

/// Label for a sentiment index value.
pub fn fear_greed_label(value: i64) -> &'static str {
    match value {
        v if v < 25 => "Extreme Fear",
        v if v < 40 => "Fear",
        v if v < 60 => "Neutral",
        v if v < 75 => "Greed",
        _ => "Extreme Greed",
    }
}

/// Sentiment records from the change over `lookback` stored closes.
pub fn fear_greed_from_prices(closes: &[Observation], lookback: usize) -> Vec<Record> {
    (lookback..closes.len())
        .filter(|&i| closes[i - lookback].value != 0.0)
        .map(|i| {
            let prev = closes[i - lookback].value;
            let change = (closes[i].value - prev) / prev * 100.0;
            let value = fear_greed_value(change);
            Record::new(closes[i].date, Provenance::Estimated)
                .with_field("value", value)
                .with_field("classification", fear_greed_label(value))
        })
        .collect()
}

/// NVT from price bars: `close * supply / (volume * close)`.
///
/// Bars with no or zero volume are skipped.
pub fn nvt(bars: &[PriceBar], supply: f64) -> Vec<Record> {
    bars.iter()
        .filter_map(|bar| {
            let volume = bar.volume.filter(|v| *v != 0.0)?;
            let market_cap = bar.close * supply;
            let tx_volume = volume * bar.close;
            let ratio = market_cap / tx_volume;
            ratio.is_finite().then(|| {
                Record::new(bar.date, Provenance::Calculated)
                    .with_field("nvt_ratio", Precision::Usd.round(ratio))
                    .with_field("market_cap", Precision::Usd.round(market_cap))
                    .with_field("tx_volume", Precision::Usd.round(tx_volume))
            })
        })
        .collect()
}

/// ETH burnt per day in `[from, to]`: `fees * burn_share / close`.
///
/// Days missing a fee or a price are skipped. `utilization` (percent,
/// keyed by day) fills `gas_utilization`; a day that has it is tagged
/// `etherscan`, otherwise `calculated`.
pub fn eth_burnt(
    fees: &[Observation],
    closes: &[Observation],
    utilization: &HashMap<NaiveDate, f64>,
    from: NaiveDate,
    to: NaiveDate,
    burn_share: f64,
) -> Vec<Record> {
    let prices: HashMap<NaiveDate, f64> = closes.iter().map(|o| (o.date, o.value)).collect();

    fees.iter()
        .filter(|fee| fee.date >= from && fee.date <= to && fee.value != 0.0)
        .filter_map(|fee| {
            let price = prices.get(&fee.date).copied().filter(|p| *p != 0.0)?;
            let burn = fee.value * burn_share / price;
            let gas_utilization = utilization.get(&fee.date).copied();
            let source = match gas_utilization {
                Some(_) => Provenance::Observed("etherscan"),
                None => Provenance::Calculated,
            };
            Some(
                Record::new(fee.date, source)
                    .with_field("eth_burnt", Precision::Usd.round(burn))
                    .with_field("avg_gas_price_gwei", None::<f64>)
                    .with_field("gas_utilization", gas_utilization.and_then(|u| Precision::Usd.round(u)))
                    .with_field("transaction_count", None::<f64>),
            )
        })
        .collect()
}

/// `floor(value * factor)` per observation, keeping dimensions.
pub fn scaled(source: &[Observation], column: &'static str, factor: f64) -> Vec<Record> {
    source
        .iter()
        .filter_map(|o| {
            let value = (o.value * factor).floor();
            value.is_finite().then(|| {
                let record = Record::new(o.date, Provenance::Estimated).with_field(column, value as i64);
                match &o.dimension {
                    Some(dimension) => record.with_dimension(dimension.clone()),
                    None => record,
                }
            })
        })
        .collect()
}

/// ETH locked: `tvl * share / close`, with `fallback_price` for days
/// without a stored close.
pub fn eth_in_defi(
    tvl: &[Observation],
    closes: &[Observation],
    share: f64,
    fallback_price: f64,
) -> Vec<Record> {
    let prices: HashMap<NaiveDate, f64> = closes.iter().map(|o| (o.date, o.value)).collect();

    tvl.iter()
        .map(|t| {
            let price = prices
                .get(&t.date)
                .copied()
                .filter(|p| *p != 0.0)
                .unwrap_or(fallback_price);
            Record::new(t.date, Provenance::Estimated)
                .with_field("eth_locked", Precision::Usd.round(t.value * share / price))
        })
        .collect()
}

/// A date in a trend model, fixed or relative to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    On(NaiveDate),
    DaysBeforeRun(u64),
}

impl Anchor {
    fn resolve(self, run_date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Anchor::On(date) => Some(date),
            Anchor::DaysBeforeRun(days) => run_date.checked_sub_days(Days::new(days)),
        }
    }
}

/// Periodic perturbation: `amplitude * trend * sin(frequency * i)`,
/// where `i` is days before the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wave {
    pub amplitude: f64,
    pub frequency: f64,
}

/// Deterministic trend-plus-noise estimate for a dataset with no source.
///
/// The trend is piecewise linear through `breakpoints` and flat outside
/// them. Noise is the sum of `waves`. The result is clamped to `floor`
/// and rounded to `precision`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSpec {
    pub column: &'static str,
    pub days: u64,
    pub breakpoints: Vec<(Anchor, f64)>,
    pub waves: Vec<Wave>,
    pub floor: f64,
    pub precision: Precision,
}

impl TrendSpec {
    /// A model for `column` covering `days` days ending on the run date.
    pub fn new(column: &'static str, days: u64) -> Self {
        Self {
            column,
            days,
            breakpoints: Vec::new(),
            waves: Vec::new(),
            floor: f64::MIN,
            precision: Precision::Usd,
        }
    }

    /// Pass the trend through `value` at `at` (builder pattern).
    pub fn through(mut self, at: Anchor, value: f64) -> Self {
        self.breakpoints.push((at, value));
        self
    }

    /// Add a perturbation term (builder pattern).
    pub fn wave(mut self, amplitude: f64, frequency: f64) -> Self {
        self.waves.push(Wave {
            amplitude,
            frequency,
        });
        self
    }

    /// Clamp values to at least `floor` (builder pattern).
    pub fn floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }

    /// Set the rounding precision (builder pattern).
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Trend value on `date`, before noise.
    pub fn trend_at(&self, date: NaiveDate, run_date: NaiveDate) -> Option<f64> {
        let mut points: Vec<(NaiveDate, f64)> = self
            .breakpoints
            .iter()
            .filter_map(|(at, value)| Some((at.resolve(run_date)?, *value)))
            .collect();
        points.sort_by_key(|(d, _)| *d);

        let first = points.first()?;
        if date <= first.0 {
            return Some(first.1);
        }
        for pair in points.windows(2) {
            let ((d0, v0), (d1, v1)) = (pair[0], pair[1]);
            if date <= d1 {
                let span = (d1 - d0).num_days() as f64;
                if span == 0.0 {
                    return Some(v1);
                }
                let progress = (date - d0).num_days() as f64 / span;
                return Some(v0 + (v1 - v0) * progress);
            }
        }
        points.last().map(|(_, v)| *v)
    }

    /// One record per day from the run date back `days - 1` days.
    pub fn generate(&self, run_date: NaiveDate) -> Vec<Record> {
        (0..self.days)
            .filter_map(|i| {
                let date = run_date.checked_sub_days(Days::new(i))?;
                let trend = self.trend_at(date, run_date)?;
                let noise: f64 = self
                    .waves
                    .iter()
                    .map(|w| (i as f64 * w.frequency).sin() * w.amplitude)
                    .sum::<f64>()
                    * trend;
                let value = (trend + noise).max(self.floor);
                Some(
                    Record::new(date, Provenance::Estimated)
                        .with_field(self.column, self.precision.round(value)),
                )
            })
            .collect()
    }
}
