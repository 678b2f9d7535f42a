//! The dataset table.
//!
//! [`all`] lists every collection task in run order. Derivations read
//! tables written earlier in the same run, so the order matters: prices,
//! fees and transaction counts come before anything computed from them.

use crate::coerce::DateFormat;
use crate::extract::Seg::{Index, Key};
use crate::extract::Path;
use crate::fallback::{Anchor, Derivation, TrendSpec};
use crate::filter::FilterRules;
use crate::normalize::{FieldSpec, SeriesSpec};
use crate::task::{Augment, Source, Task};
use chrono::NaiveDate;
use ethval_types::{DatasetDescriptor, Precision};
use url::Url;

/// Days of history kept for windowed datasets.
pub const RETENTION_DAYS: u64 = 1095;

/// Approximate circulating supply used by NVT.
pub const ETH_SUPPLY: f64 = 120_400_000.0;

pub const PRICE_TABLE: &str = "historical_eth_price";
pub const TVL_TABLE: &str = "historical_ethereum_tvl";
pub const FEES_TABLE: &str = "historical_protocol_fees";
pub const TRANSACTIONS_TABLE: &str = "historical_transactions";
pub const L2_TRANSACTIONS_TABLE: &str = "historical_l2_transactions";

pub const L2_CHAINS: &[&str] = &[
    "Arbitrum",
    "Optimism",
    "Base",
    "zkSync Era",
    "Linea",
    "Scroll",
    "Blast",
];

pub const L2_ORIGINS: &[&str] = &[
    "arbitrum",
    "optimism",
    "base",
    "zksync_era",
    "linea",
    "scroll",
    "blast",
    "manta",
    "mode",
    "zora",
    "polygon_zkevm",
    "starknet",
];

pub const TVL_PROTOCOLS: &[&str] = &["lido", "aave", "makerdao", "uniswap", "eigenlayer"];
pub const DEX_PROTOCOLS: &[&str] = &["uniswap", "curve-dex", "balancer"];

const ETHERSCAN_API: &str = "https://api.etherscan.io/api";
const GROWTHEPIE_TXCOUNT: &str = "https://api.growthepie.xyz/v1/export/txcount.json";
const LLAMA_CHAIN_TVL: &str = "https://api.llama.fi/v2/historicalChainTvl";
const LLAMA_ETHEREUM_TVL: &str = "https://api.llama.fi/v2/historicalChainTvl/Ethereum";
const COINGECKO_GLOBAL: &str = "https://api.coingecko.com/api/v3/global";

const DATE_MS: Path = &[Index(0)];
const DATE_FIELD: Path = &[Key("date")];

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Daily klines `[openTime, open, high, low, close, volume, ...]`.
fn klines() -> SeriesSpec {
    SeriesSpec::root_array().dated(DATE_MS, DateFormat::EpochMillis)
}

/// DefiLlama `[{date, tvl}]` chain TVL.
fn chain_tvl(column: &'static str) -> SeriesSpec {
    SeriesSpec::root_array()
        .dated(DATE_FIELD, DateFormat::EpochSeconds)
        .field(FieldSpec::number(column, &[&[Key("tvl")]]))
}

/// DefiLlama `{totalDataChart: [[ts, value], ...]}`.
fn data_chart(column: &'static str) -> SeriesSpec {
    SeriesSpec::rows_at(&[&[Key("totalDataChart")]])
        .dated(&[Index(0)], DateFormat::EpochSeconds)
        .field(FieldSpec::number(column, &[&[Index(1)]]))
}

/// DefiLlama stablecoin chart; the USD total moved keys between versions.
fn stablecoin_chart() -> SeriesSpec {
    SeriesSpec::root_array()
        .dated(DATE_FIELD, DateFormat::EpochSeconds)
        .field(
            FieldSpec::number(
                "total_mcap",
                &[
                    &[Key("totalCirculatingUSD"), Key("peggedUSD")],
                    &[Key("totalCirculating"), Key("peggedUSD")],
                ],
            )
            .or_default(0.0),
        )
}

/// growthepie export rows `{metric_key, origin_key, date, value}`.
fn txcount_export() -> SeriesSpec {
    SeriesSpec::root_array()
        .filter(&[Key("metric_key")], "txcount")
        .dated(DATE_FIELD, DateFormat::Iso)
        .field(FieldSpec::integer("tx_count", &[&[Key("value")]]))
}

/// Etherscan daily network utilization, as a percentage.
pub fn etherscan_utilization() -> SeriesSpec {
    SeriesSpec::rows_at(&[&[Key("result")]])
        .guard(&[Key("status")], "1")
        .dated(&[Key("UTCDate")], DateFormat::Iso)
        .field(
            FieldSpec::number("gas_utilization", &[&[Key("networkUtilization")]])
                .multiply(100.0)
                .precision(Precision::Exact),
        )
}

/// Etherscan utilization request for `[from, to]`.
pub fn etherscan_utilization_url(
    from: NaiveDate,
    to: NaiveDate,
    api_key: &str,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(ETHERSCAN_API)?;
    url.query_pairs_mut()
        .append_pair("module", "stats")
        .append_pair("action", "dailynetutilization")
        .append_pair("startdate", &from.format("%Y-%m-%d").to_string())
        .append_pair("enddate", &to.format("%Y-%m-%d").to_string())
        .append_pair("sort", "asc")
        .append_pair("apikey", api_key);
    Ok(url)
}

/// Every collection task, in run order.
pub fn all() -> Vec<Task> {
    vec![
        Task::new(DatasetDescriptor::new(
            "eth_price",
            PRICE_TABLE,
            &["open", "high", "low", "close", "volume"],
        ))
        .source(Source::observed(
            "binance",
            "https://api.binance.com/api/v3/klines?symbol=ETHUSDT&interval=1d&limit=1100",
            klines()
                .field(FieldSpec::number("open", &[&[Index(1)]]))
                .field(FieldSpec::number("high", &[&[Index(2)]]))
                .field(FieldSpec::number("low", &[&[Index(3)]]))
                .field(FieldSpec::number("close", &[&[Index(4)]]))
                .field(FieldSpec::number("volume", &[&[Index(5)]])),
        ))
        .rules(FilterRules::new().positive("close")),
        Task::new(DatasetDescriptor::new("ethereum_tvl", TVL_TABLE, &["tvl"]))
            .source(Source::observed("defillama", LLAMA_ETHEREUM_TVL, chain_tvl("tvl")))
            .rules(FilterRules::new().positive("tvl").recency(RETENTION_DAYS)),
        Task::new(DatasetDescriptor::new("l2_tvl", "historical_l2_tvl", &["tvl"]).keyed_by("chain"))
            .source(Source::per_dimension(
                "defillama",
                LLAMA_CHAIN_TVL,
                None,
                L2_CHAINS,
                chain_tvl("tvl"),
            ))
            .rules(FilterRules::new().positive("tvl").recency(RETENTION_DAYS)),
        Task::new(DatasetDescriptor::new("protocol_fees", FEES_TABLE, &["fees"]))
            .source(Source::observed(
                "defillama",
                "https://api.llama.fi/summary/fees/ethereum?dataType=dailyFees",
                data_chart("fees"),
            ))
            .rules(FilterRules::new().positive("fees")),
        Task::new(DatasetDescriptor::new(
            "staking",
            "historical_staking",
            &["total_staked_eth", "total_validators", "avg_apr"],
        ))
        .source(
            Source::observed(
                "beaconchain",
                "https://beaconcha.in/api/v1/chart/staked_ether",
                SeriesSpec::rows_at(&[&[Key("data")]])
                    .guard(&[Key("status")], "OK")
                    .dated(DATE_MS, DateFormat::EpochMillis)
                    .field(FieldSpec::number("total_staked_eth", &[&[Index(1)]]))
                    .field(FieldSpec::integer("total_validators", &[&[Index(1)]]).divide(32.0))
                    .field(FieldSpec::null("avg_apr")),
            )
            .augment(Augment {
                url: "https://eth-api.lido.fi/v1/protocol/steth/apr/sma",
                path: &[Key("data"), Key("smaApr")],
                column: "avg_apr",
                precision: Precision::Usd,
            }),
        )
        .rules(
            FilterRules::new()
                .range("total_staked_eth", 15_000_000.0, 40_000_000.0)
                .max_daily_change("total_staked_eth", 2.0)
                .recency(RETENTION_DAYS),
        ),
        Task::new(DatasetDescriptor::new(
            "gas_burn",
            "historical_gas_burn",
            &["eth_burnt", "avg_gas_price_gwei", "gas_utilization", "transaction_count"],
        ))
        .derive(Derivation::GasBurn {
            fees: FEES_TABLE,
            prices: PRICE_TABLE,
            burn_share: 0.8,
            first_day: day(2022, 1, 2),
        })
        .rules(FilterRules::new().range("eth_burnt", 50.0, 50_000.0)),
        Task::new(DatasetDescriptor::new(
            "active_addresses",
            "historical_active_addresses",
            &["active_addresses"],
        ))
        .derive(Derivation::Scaled {
            from: TRANSACTIONS_TABLE,
            from_column: "tx_count",
            column: "active_addresses",
            factor: 0.4,
        })
        .rules(FilterRules::new().positive("active_addresses")),
        Task::new(DatasetDescriptor::new("eth_supply", "historical_eth_supply", &["eth_supply"]))
            .source(Source::observed(
                "ultrasound",
                "https://ultrasound.money/api/v2/fees/supply-over-time",
                SeriesSpec::root_array()
                    .dated(&[Key("timestamp")], DateFormat::EpochSeconds)
                    .field(FieldSpec::number("eth_supply", &[&[Key("supply")]]).divide(1e18))
                    .keep_last(RETENTION_DAYS as usize),
            ))
            .estimate(
                TrendSpec::new("eth_supply", RETENTION_DAYS)
                    .through(Anchor::DaysBeforeRun(0), ETH_SUPPLY)
                    .through(
                        Anchor::DaysBeforeRun(RETENTION_DAYS - 1),
                        ETH_SUPPLY + 100.0 * (RETENTION_DAYS - 1) as f64,
                    ),
            )
            .rules(FilterRules::new().positive("eth_supply")),
        Task::new(DatasetDescriptor::new(
            "fear_greed",
            "historical_fear_greed",
            &["value", "classification"],
        ))
        .source(Source::observed(
            "alternative_me",
            "https://api.alternative.me/fng/?limit=1095&format=json",
            SeriesSpec::rows_at(&[&[Key("data")]])
                .dated(&[Key("timestamp")], DateFormat::EpochSeconds)
                .field(FieldSpec::integer("value", &[&[Key("value")]]))
                .field(FieldSpec::text("classification", &[&[Key("value_classification")]]))
                .min_records(11),
        ))
        .derive(Derivation::FearGreed {
            prices: PRICE_TABLE,
            lookback: 30,
        })
        .rules(FilterRules::new().range("value", 0.0, 100.0)),
        Task::new(DatasetDescriptor::new("dex_volume", "historical_dex_volume", &["volume"]))
            .source(Source::observed(
                "defillama",
                "https://api.llama.fi/overview/dexs/ethereum?excludeTotalDataChart=false&excludeTotalDataChartBreakdown=true&dataType=dailyVolume",
                data_chart("volume"),
            ))
            .rules(FilterRules::new().positive("volume")),
        Task::new(DatasetDescriptor::new("stablecoins", "historical_stablecoins", &["total_mcap"]))
            .source(Source::observed(
                "defillama",
                "https://stablecoins.llama.fi/stablecoincharts/all",
                stablecoin_chart(),
            ))
            .rules(FilterRules::new().positive("total_mcap").recency(RETENTION_DAYS)),
        Task::new(DatasetDescriptor::new(
            "stablecoins_eth",
            "historical_stablecoins_eth",
            &["total_mcap"],
        ))
        .source(Source::observed(
            "defillama",
            "https://stablecoins.llama.fi/stablecoincharts/Ethereum",
            stablecoin_chart(),
        ))
        .rules(FilterRules::new().positive("total_mcap").recency(RETENTION_DAYS)),
        Task::new(DatasetDescriptor::new("eth_btc", "historical_eth_btc", &["ratio"]))
            .source(Source::observed(
                "binance",
                "https://api.binance.com/api/v3/klines?symbol=ETHBTC&interval=1d&limit=1100",
                klines().field(FieldSpec::number("ratio", &[&[Index(4)]]).precision(Precision::Ratio)),
            ))
            .rules(FilterRules::new().positive("ratio")),
        Task::new(DatasetDescriptor::new(
            "funding_rate",
            "historical_funding_rate",
            &["funding_rate"],
        ))
        .source(Source::observed(
            "binance",
            "https://fapi.binance.com/fapi/v1/fundingRate?symbol=ETHUSDT&limit=1000",
            SeriesSpec::root_array()
                .dated(&[Key("fundingTime")], DateFormat::EpochMillis)
                .field(
                    FieldSpec::number("funding_rate", &[&[Key("fundingRate")]])
                        .precision(Precision::Rate),
                )
                .daily_mean(),
        )),
        Task::new(DatasetDescriptor::new(
            "exchange_reserve",
            "historical_exchange_reserve",
            &["reserve_eth"],
        ))
        .estimate(
            TrendSpec::new("reserve_eth", RETENTION_DAYS)
                .through(Anchor::On(day(2022, 11, 1)), 24_000_000.0)
                .through(Anchor::On(day(2023, 6, 1)), 18_000_000.0)
                .through(Anchor::DaysBeforeRun(0), 15_000_000.0)
                .wave(0.005, 0.3)
                .wave(0.005, 0.07)
                .floor(14_000_000.0)
                .precision(Precision::Whole),
        )
        .rules(FilterRules::new().positive("reserve_eth")),
        Task::new(DatasetDescriptor::new(
            "eth_dominance",
            "historical_eth_dominance",
            &["eth_dominance", "btc_dominance", "total_mcap"],
        ))
        .source(Source::observed(
            "coingecko",
            COINGECKO_GLOBAL,
            SeriesSpec::snapshot(&[Key("data")])
                .field(FieldSpec::number(
                    "eth_dominance",
                    &[&[Key("market_cap_percentage"), Key("eth")]],
                ))
                .field(FieldSpec::number(
                    "btc_dominance",
                    &[&[Key("market_cap_percentage"), Key("btc")]],
                ))
                .field(FieldSpec::number(
                    "total_mcap",
                    &[&[Key("total_market_cap"), Key("usd")]],
                )),
        ))
        .rules(FilterRules::new().positive("eth_dominance"))
        .rate_limited(),
        Task::new(DatasetDescriptor::new("blob_data", "historical_blob_data", &[])),
        Task::new(DatasetDescriptor::new("lending_tvl", "historical_lending_tvl", &["total_tvl"]))
            .source(
                Source::observed(
                    "defillama",
                    LLAMA_ETHEREUM_TVL,
                    SeriesSpec::root_array()
                        .dated(DATE_FIELD, DateFormat::EpochSeconds)
                        .field(FieldSpec::number("total_tvl", &[&[Key("tvl")]]).multiply(0.5)),
                )
                .scaled_proxy(),
            )
            .rules(FilterRules::new().positive("total_tvl").recency(RETENTION_DAYS)),
        Task::new(DatasetDescriptor::new(
            "volatility",
            "historical_volatility",
            &["volatility_30d"],
        ))
        .derive(Derivation::Volatility {
            prices: PRICE_TABLE,
            window: 30,
        })
        .rules(FilterRules::new().positive("volatility_30d")),
        Task::new(DatasetDescriptor::new(
            "nvt",
            "historical_nvt",
            &["nvt_ratio", "market_cap", "tx_volume"],
        ))
        .derive(Derivation::Nvt {
            prices: PRICE_TABLE,
            supply: ETH_SUPPLY,
        })
        .rules(
            FilterRules::new()
                .positive("nvt_ratio")
                .range("nvt_ratio", 0.0, 1000.0),
        ),
        Task::new(DatasetDescriptor::new("transactions", TRANSACTIONS_TABLE, &["tx_count"]))
            .source(Source::observed(
                "growthepie",
                GROWTHEPIE_TXCOUNT,
                txcount_export().filter(&[Key("origin_key")], "ethereum"),
            ))
            .rules(FilterRules::new().positive("tx_count")),
        Task::new(
            DatasetDescriptor::new("l2_transactions", L2_TRANSACTIONS_TABLE, &["tx_count"])
                .keyed_by("chain"),
        )
        .source(Source::observed(
            "growthepie",
            GROWTHEPIE_TXCOUNT,
            txcount_export().dimension_from(&[Key("origin_key")], L2_ORIGINS),
        ))
        .rules(FilterRules::new().positive("tx_count")),
        Task::new(
            DatasetDescriptor::new("l2_addresses", "historical_l2_addresses", &["active_addresses"])
                .keyed_by("chain"),
        )
        .derive(Derivation::Scaled {
            from: L2_TRANSACTIONS_TABLE,
            from_column: "tx_count",
            column: "active_addresses",
            factor: 0.3,
        })
        .rules(FilterRules::new().positive("active_addresses")),
        Task::new(
            DatasetDescriptor::new("protocol_tvl", "historical_protocol_tvl", &["tvl"])
                .keyed_by("protocol"),
        )
        .source(Source::per_dimension(
            "defillama",
            "https://api.llama.fi/protocol",
            None,
            TVL_PROTOCOLS,
            SeriesSpec::rows_at(&[&[Key("tvl")]])
                .dated(DATE_FIELD, DateFormat::EpochSeconds)
                .field(FieldSpec::number("tvl", &[&[Key("totalLiquidityUSD")]])),
        ))
        .rules(FilterRules::new().positive("tvl").recency(RETENTION_DAYS)),
        Task::new(DatasetDescriptor::new("staking_apr", "historical_staking_apr", &["lido_apr"]))
            .source(Source::observed(
                "defillama",
                "https://yields.llama.fi/chart/747c1d2a-c668-4682-b9f9-296708a3dd90",
                SeriesSpec::rows_at(&[&[Key("data")]])
                    .dated(&[Key("timestamp")], DateFormat::Iso)
                    .field(FieldSpec::number("lido_apr", &[&[Key("apy")]])),
            ))
            .rules(FilterRules::new().positive("lido_apr")),
        Task::new(DatasetDescriptor::new("eth_in_defi", "historical_eth_in_defi", &["eth_locked"]))
            .derive(Derivation::EthInDefi {
                tvl: TVL_TABLE,
                prices: PRICE_TABLE,
                share: 0.3,
                fallback_price: 3000.0,
            })
            .rules(FilterRules::new().positive("eth_locked")),
        Task::new(DatasetDescriptor::new(
            "global_mcap",
            "historical_global_mcap",
            &["total_mcap", "btc_mcap"],
        ))
        .source(Source::observed(
            "coingecko",
            COINGECKO_GLOBAL,
            SeriesSpec::snapshot(&[Key("data")])
                .field(FieldSpec::number("total_mcap", &[&[Key("total_market_cap"), Key("usd")]]))
                .field(FieldSpec::number("btc_mcap", &[&[Key("total_market_cap"), Key("btc")]])),
        ))
        .rules(FilterRules::new().positive("total_mcap"))
        .rate_limited(),
        Task::new(
            DatasetDescriptor::new("dex_by_protocol", "historical_dex_by_protocol", &["volume"])
                .keyed_by("protocol"),
        )
        .source(Source::per_dimension(
            "defillama",
            "https://api.llama.fi/summary/dexs",
            Some("dataType=dailyVolume"),
            DEX_PROTOCOLS,
            data_chart("volume"),
        ))
        .rules(FilterRules::new().positive("volume")),
        Task::new(DatasetDescriptor::new(
            "network_stats",
            "historical_network_stats",
            &["epoch", "block_count", "avg_block_time"],
        ))
        .source(Source::observed(
            "beaconchain",
            "https://beaconcha.in/api/v1/epoch/latest",
            SeriesSpec::snapshot(&[Key("data")])
                .field(FieldSpec::integer("epoch", &[&[Key("epoch")]]))
                .field(FieldSpec::constant("block_count", 7200.0).precision(Precision::Whole))
                .field(FieldSpec::constant("avg_block_time", 12.0).precision(Precision::Whole)),
        ))
        .rules(FilterRules::new().positive("epoch")),
    ]
}

/// Look up a task by dataset name.
pub fn by_name(name: &str) -> Option<Task> {
    all().into_iter().find(|task| task.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_shape() {
        let tasks = all();
        assert_eq!(tasks.len(), 29);

        let names: HashSet<&str> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), 29, "dataset names must be unique");

        let tables: HashSet<&str> = tasks.iter().map(|t| t.descriptor.table).collect();
        assert_eq!(tables.len(), 29, "tables must be unique");

        assert_eq!(tasks[0].name(), "eth_price");
        assert_eq!(tasks[28].name(), "network_stats");
    }

    #[test]
    fn test_derivation_inputs_run_first() {
        let tasks = all();
        let position = |table: &str| tasks.iter().position(|t| t.descriptor.table == table);

        for (index, task) in tasks.iter().enumerate() {
            let inputs: Vec<&str> = match &task.fallback {
                Some(crate::task::Fallback::Derive(derivation)) => match *derivation {
                    Derivation::Volatility { prices, .. }
                    | Derivation::FearGreed { prices, .. }
                    | Derivation::Nvt { prices, .. } => vec![prices],
                    Derivation::GasBurn { fees, prices, .. } => vec![fees, prices],
                    Derivation::Scaled { from, .. } => vec![from],
                    Derivation::EthInDefi { tvl, prices, .. } => vec![tvl, prices],
                },
                _ => Vec::new(),
            };
            for input in inputs {
                let at = position(input).unwrap_or_else(|| panic!("{input} is not collected"));
                assert!(at < index, "{} reads {} before it is collected", task.name(), input);
            }
        }
    }

    #[test]
    fn test_nvt_upper_bound_is_inclusive() {
        use ethval_types::{Provenance, Record};

        let task = by_name("nvt").unwrap();
        let records = [(1, 0.0), (2, 1000.0), (3, 1000.01), (4, 12.5)]
            .into_iter()
            .map(|(d, nvt)| Record::new(day(2024, 1, d), Provenance::Calculated).with_field("nvt_ratio", nvt))
            .collect();

        let (kept, stats) = task.rules.apply(records, day(2024, 1, 5));
        let kept: Vec<NaiveDate> = kept.iter().map(|r| r.date).collect();
        assert_eq!(kept, vec![day(2024, 1, 2), day(2024, 1, 4)]);
        assert_eq!(stats.kept(), 2);
    }

    #[test]
    fn test_rate_limited_tasks() {
        let limited: Vec<&str> = all()
            .iter()
            .filter(|t| t.pacing == crate::task::Pacing::RateLimited)
            .map(|t| t.name())
            .collect();
        assert_eq!(limited, vec!["eth_dominance", "global_mcap"]);
    }

    #[test]
    fn test_blob_data_has_nothing_to_collect() {
        let task = by_name("blob_data").unwrap();
        assert!(task.source.is_none());
        assert!(task.fallback.is_none());
    }

    #[test]
    fn test_etherscan_url_and_series() {
        let url = etherscan_utilization_url(day(2024, 1, 2), day(2024, 1, 9), "k").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.etherscan.io/api?module=stats&action=dailynetutilization&startdate=2024-01-02&enddate=2024-01-09&sort=asc&apikey=k"
        );
        assert_eq!(etherscan_utilization().guards.len(), 1);
    }

    #[test]
    fn test_every_dimension_task_is_keyed() {
        for task in all() {
            let per_dimension = matches!(
                task.source.as_ref().map(|s| &s.fetch),
                Some(crate::task::Fetch::PerDimension { .. })
            ) || task
                .source
                .as_ref()
                .is_some_and(|s| s.series.dimension.is_some());
            if per_dimension {
                assert!(task.descriptor.conflict.dimension().is_some(), "{}", task.name());
            }
        }
    }
}
