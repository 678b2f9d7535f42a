//! End-to-end collection runs against a mock HTTP client and the
//! in-memory store.

use chrono::{Days, NaiveDate};
use ethval_ingestion::{FetchPolicy, Fetcher, MockHttp};
use ethval_pipeline::datasets::{self, FEES_TABLE, L2_TRANSACTIONS_TABLE, PRICE_TABLE};
use ethval_pipeline::{Collector, CollectorConfig, Origin};
use ethval_store::MemoryStore;
use ethval_types::Row;
use serde_json::{json, Value};
use std::time::Duration;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn epoch_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis()
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn collector(http: MockHttp, store: MemoryStore, config: CollectorConfig) -> Collector<MockHttp, MemoryStore> {
    let policy = FetchPolicy::default()
        .with_max_retries(2)
        .with_base_backoff(Duration::ZERO);
    Collector::new(Fetcher::new(http, policy), store, config.without_pauses())
}

/// Daily closes starting 2024-01-01.
fn price_rows(closes: &[f64]) -> Vec<Row> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let date = day(2024, 1, 1) + Days::new(i as u64);
            row(json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "close": close,
                "volume": 250_000.0,
                "source": "binance",
            }))
        })
        .collect()
}

fn rows_by_date(store: &MemoryStore, table: &str) -> Vec<Row> {
    let mut rows = store.rows(table);
    rows.sort_by(|a, b| a["date"].as_str().cmp(&b["date"].as_str()));
    rows
}

#[tokio::test]
async fn test_staking_delta_rule_and_apr_augment() {
    let start = day(2024, 1, 1);
    let http = MockHttp::new()
        .with_json(
            "https://beaconcha.in/api/v1/chart/staked_ether",
            json!({
                "status": "OK",
                "data": [
                    [epoch_ms(start), 30_000_000.0],
                    [epoch_ms(start + Days::new(1)), 33_000_000.0],
                    [epoch_ms(start + Days::new(2)), 30_050_000.0],
                ]
            }),
        )
        .with_json(
            "https://eth-api.lido.fi/v1/protocol/steth/apr/sma",
            json!({ "data": { "smaApr": 3.4512 } }),
        );
    let store = MemoryStore::new();
    let collector = collector(
        http,
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 3)),
    );

    let report = collector.run(&[datasets::by_name("staking").unwrap()]).await;
    let outcome = report.get("staking").unwrap();
    assert_eq!(outcome.origin, Origin::Primary);
    assert_eq!(outcome.merged, 2);
    assert_eq!(outcome.filter.abrupt, 1);

    let rows = rows_by_date(&store, "historical_staking");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["date"], "2024-01-01");
    assert_eq!(rows[0]["total_validators"], 937_500);
    assert_eq!(rows[0]["avg_apr"], Value::Null);
    assert_eq!(rows[1]["date"], "2024-01-03");
    assert_eq!(rows[1]["total_staked_eth"].as_f64(), Some(30_050_000.0));
    assert_eq!(rows[1]["avg_apr"].as_f64(), Some(3.45));
    assert_eq!(rows[1]["source"], "beaconchain");
}

#[tokio::test]
async fn test_fear_greed_derived_when_primary_is_thin() {
    // Fewer than 11 readings is not a usable history.
    let http = MockHttp::new().with_json(
        "https://api.alternative.me/fng",
        json!({ "data": [
            { "value": "40", "value_classification": "Fear", "timestamp": "1706745600" }
        ]}),
    );
    let closes: Vec<f64> = (0..40).map(|i| 2000.0 + 10.0 * i as f64).collect();
    let store = MemoryStore::new().with_rows(PRICE_TABLE, &["date"], price_rows(&closes));
    let collector = collector(
        http,
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 2, 10)),
    );

    let report = collector.run(&[datasets::by_name("fear_greed").unwrap()]).await;
    let outcome = report.get("fear_greed").unwrap();
    assert_eq!(outcome.origin, Origin::Fallback);
    assert_eq!(outcome.merged, 10);

    let rows = rows_by_date(&store, "historical_fear_greed");
    // 2000 -> 2300 over 30 days is +15%.
    assert_eq!(rows[0]["date"], "2024-01-31");
    assert_eq!(rows[0]["value"], 65);
    assert_eq!(rows[0]["classification"], "Greed");
    assert!(rows.iter().all(|r| r["source"] == "estimated"));
}

#[tokio::test]
async fn test_fear_greed_primary_wins() {
    let readings: Vec<Value> = (0..12i64)
        .map(|i| {
            json!({
                "value": "72",
                "value_classification": "Greed",
                "timestamp": (1_704_067_200 + i * 86_400).to_string(),
            })
        })
        .collect();
    let http = MockHttp::new().with_json("https://api.alternative.me/fng", json!({ "data": readings }));
    let store = MemoryStore::new();
    let collector = collector(
        http,
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 20)),
    );

    let report = collector.run(&[datasets::by_name("fear_greed").unwrap()]).await;
    assert_eq!(report.get("fear_greed").unwrap().origin, Origin::Primary);
    assert_eq!(store.len("historical_fear_greed"), 12);
    assert!(store
        .rows("historical_fear_greed")
        .iter()
        .all(|r| r["source"] == "alternative_me" && r["value"] == 72));
}

#[tokio::test]
async fn test_supply_estimated_after_retries_exhausted() {
    let http = MockHttp::new().with_status("https://ultrasound.money", 500);
    let store = MemoryStore::new();
    let run_date = day(2024, 6, 1);
    let collector = collector(
        http.clone(),
        store.clone(),
        CollectorConfig::default().with_run_date(run_date),
    );

    let report = collector.run(&[datasets::by_name("eth_supply").unwrap()]).await;
    let outcome = report.get("eth_supply").unwrap();
    assert_eq!(outcome.origin, Origin::Fallback);
    assert_eq!(outcome.merged, 1095);
    assert_eq!(http.call_count("https://ultrasound.money"), 2);

    let rows = rows_by_date(&store, "historical_eth_supply");
    assert_eq!(rows.len(), 1095);
    let latest = rows.last().unwrap();
    assert_eq!(latest["date"], "2024-06-01");
    assert_eq!(latest["eth_supply"].as_f64(), Some(120_400_000.0));
    assert!(rows.iter().all(|r| r["source"] == "estimated"));
}

#[tokio::test]
async fn test_l2_tvl_fetches_each_chain() {
    let ts: i64 = 1_704_067_200; // 2024-01-01
    let http = MockHttp::new()
        .with_json(
            "https://api.llama.fi/v2/historicalChainTvl/Arbitrum",
            json!([{ "date": ts, "tvl": 15_000_000_000.0 }]),
        )
        .with_json(
            "https://api.llama.fi/v2/historicalChainTvl/zkSync%20Era",
            json!([{ "date": ts, "tvl": 700_000_000.0 }]),
        );
    let store = MemoryStore::new();
    let collector = collector(
        http.clone(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 2)),
    );

    let report = collector.run(&[datasets::by_name("l2_tvl").unwrap()]).await;
    assert_eq!(report.get("l2_tvl").unwrap().merged, 2);

    let mut chains: Vec<String> = store
        .rows("historical_l2_tvl")
        .iter()
        .filter_map(|r| r["chain"].as_str().map(str::to_string))
        .collect();
    chains.sort();
    assert_eq!(chains, vec!["Arbitrum", "zkSync Era"]);

    // Every chain is requested, including the ones with no data.
    for chain in ["Optimism", "Base", "zkSync%20Era", "Linea", "Scroll", "Blast"] {
        let url = format!("https://api.llama.fi/v2/historicalChainTvl/{chain}");
        assert!(http.call_count(&url) >= 1, "{url} never requested");
    }
}

fn gas_burn_store(last_burn: &str) -> MemoryStore {
    let fees: Vec<Row> = (1..=5)
        .map(|d| {
            row(json!({
                "date": format!("2024-01-0{d}"),
                "fees": 10_000_000.0,
                "source": "defillama",
            }))
        })
        .collect();
    MemoryStore::new()
        .with_rows(FEES_TABLE, &["date"], fees)
        .with_rows(PRICE_TABLE, &["date"], price_rows(&[2000.0; 5]))
        .with_rows(
            "historical_gas_burn",
            &["date"],
            vec![row(json!({ "date": last_burn, "eth_burnt": 4000.0, "source": "calculated" }))],
        )
}

#[tokio::test]
async fn test_gas_burn_fills_missing_days_with_utilization() {
    let http = MockHttp::new().with_json(
        "https://api.etherscan.io/api",
        json!({
            "status": "1",
            "result": [{ "UTCDate": "2024-01-03", "networkUtilization": "0.5123" }]
        }),
    );
    let store = gas_burn_store("2024-01-02");
    let collector = collector(
        http.clone(),
        store.clone(),
        CollectorConfig::default()
            .with_run_date(day(2024, 1, 5))
            .with_etherscan_key("test-key"),
    );

    let report = collector.run(&[datasets::by_name("gas_burn").unwrap()]).await;
    assert_eq!(report.get("gas_burn").unwrap().merged, 2);

    let calls = http.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("startdate=2024-01-03&enddate=2024-01-04"));

    let rows = rows_by_date(&store, "historical_gas_burn");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["date"], "2024-01-03");
    assert_eq!(rows[1]["eth_burnt"].as_f64(), Some(4000.0));
    assert_eq!(rows[1]["gas_utilization"].as_f64(), Some(51.23));
    assert_eq!(rows[1]["source"], "etherscan");
    assert_eq!(rows[2]["date"], "2024-01-04");
    assert_eq!(rows[2]["gas_utilization"], Value::Null);
    assert_eq!(rows[2]["source"], "calculated");
}

#[tokio::test]
async fn test_gas_burn_without_key_skips_utilization() {
    let http = MockHttp::new();
    let store = gas_burn_store("2024-01-02");
    let collector = collector(
        http.clone(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 5)),
    );

    let report = collector.run(&[datasets::by_name("gas_burn").unwrap()]).await;
    assert_eq!(report.get("gas_burn").unwrap().merged, 2);
    assert!(http.calls().is_empty());
    assert!(store
        .rows("historical_gas_burn")
        .iter()
        .all(|r| r["source"] == "calculated"));
}

#[tokio::test]
async fn test_gas_burn_empty_table_starts_on_second_of_january_2022() {
    let days = ["2021-12-31", "2022-01-01", "2022-01-02", "2022-01-03"];
    let fees = days
        .iter()
        .map(|d| row(json!({ "date": d, "fees": 10_000_000.0, "source": "defillama" })))
        .collect();
    let prices = days
        .iter()
        .map(|d| row(json!({ "date": d, "close": 2000.0, "volume": 250_000.0, "source": "binance" })))
        .collect();
    let store = MemoryStore::new()
        .with_rows(FEES_TABLE, &["date"], fees)
        .with_rows(PRICE_TABLE, &["date"], prices);
    let collector = collector(
        MockHttp::new(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2022, 1, 4)),
    );

    let report = collector.run(&[datasets::by_name("gas_burn").unwrap()]).await;
    assert_eq!(report.get("gas_burn").unwrap().merged, 2);

    let rows = rows_by_date(&store, "historical_gas_burn");
    let dates: Vec<&str> = rows.iter().filter_map(|r| r["date"].as_str()).collect();
    assert_eq!(dates, ["2022-01-02", "2022-01-03"]);
    assert_eq!(rows[0]["eth_burnt"].as_f64(), Some(4000.0));
}

#[tokio::test]
async fn test_gas_burn_up_to_date() {
    let store = gas_burn_store("2024-01-04");
    let collector = collector(
        MockHttp::new(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 5)),
    );

    let report = collector.run(&[datasets::by_name("gas_burn").unwrap()]).await;
    let outcome = report.get("gas_burn").unwrap();
    assert_eq!(outcome.merged, 0);
    assert!(outcome.error.is_none());
    assert_eq!(store.len("historical_gas_burn"), 1);
}

#[tokio::test]
async fn test_l2_addresses_scaled_per_chain() {
    let store = MemoryStore::new().with_rows(
        L2_TRANSACTIONS_TABLE,
        &["date", "chain"],
        vec![
            row(json!({ "date": "2024-01-01", "chain": "arbitrum", "tx_count": 1_000_001, "source": "growthepie" })),
            row(json!({ "date": "2024-01-01", "chain": "base", "tx_count": 2_000_000, "source": "growthepie" })),
        ],
    );
    let collector = collector(
        MockHttp::new(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 2)),
    );

    let report = collector.run(&[datasets::by_name("l2_addresses").unwrap()]).await;
    assert_eq!(report.get("l2_addresses").unwrap().merged, 2);

    let rows = store.rows("historical_l2_addresses");
    let arbitrum = rows.iter().find(|r| r["chain"] == "arbitrum").unwrap();
    assert_eq!(arbitrum["active_addresses"], 300_000);
    let base = rows.iter().find(|r| r["chain"] == "base").unwrap();
    assert_eq!(base["active_addresses"], 600_000);
}

#[tokio::test]
async fn test_volatility_from_stored_prices() {
    let closes: Vec<f64> = (0..35)
        .map(|i| if i % 2 == 0 { 2000.0 } else { 2100.0 })
        .collect();
    let store = MemoryStore::new().with_rows(PRICE_TABLE, &["date"], price_rows(&closes));
    let collector = collector(
        MockHttp::new(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 2, 5)),
    );

    let report = collector.run(&[datasets::by_name("volatility").unwrap()]).await;
    let outcome = report.get("volatility").unwrap();
    assert_eq!(outcome.origin, Origin::Fallback);
    assert_eq!(outcome.merged, 5);
    assert!(store
        .rows("historical_volatility")
        .iter()
        .all(|r| r["volatility_30d"].as_f64().is_some_and(|v| v > 0.0) && r["source"] == "calculated"));
}

#[tokio::test]
async fn test_blob_data_is_unavailable() {
    let http = MockHttp::new();
    let store = MemoryStore::new();
    let collector = collector(
        http.clone(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 2)),
    );

    let report = collector.run(&[datasets::by_name("blob_data").unwrap()]).await;
    let outcome = report.get("blob_data").unwrap();
    assert_eq!(outcome.origin, Origin::Unavailable);
    assert_eq!(outcome.merged, 0);
    assert!(http.calls().is_empty());
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_store_failure_does_not_stop_the_run() {
    let ts: i64 = 1_704_067_200;
    let http = MockHttp::new()
        .with_json(
            "https://api.binance.com/api/v3/klines?symbol=ETHUSDT",
            json!([[ts * 1000, "2000", "2100", "1950", "2050", "1000", ts * 1000 + 86_399_999]]),
        )
        .with_json(
            "https://api.llama.fi/v2/historicalChainTvl/Ethereum",
            json!([{ "date": ts, "tvl": 60_000_000_000.0 }]),
        );
    let store = MemoryStore::new().fail_table(PRICE_TABLE);
    let collector = collector(
        http,
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 1, 2)),
    );
    let tasks = vec![
        datasets::by_name("eth_price").unwrap(),
        datasets::by_name("ethereum_tvl").unwrap(),
    ];

    let report = collector.run(&tasks).await;
    assert_eq!(report.get("eth_price").unwrap().merged, 0);
    assert_eq!(report.get("ethereum_tvl").unwrap().merged, 1);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.total_merged(), 1);
    assert!(report.to_string().contains("Success: 1/2 | Failed: 1/2 | Records: 1"));
}

#[tokio::test]
async fn test_full_run_with_every_source_down() {
    let store = MemoryStore::new();
    let collector = collector(
        MockHttp::new(),
        store.clone(),
        CollectorConfig::default().with_run_date(day(2024, 6, 1)),
    );

    let report = collector.run(&datasets::all()).await;
    assert_eq!(report.outcomes().len(), 29);
    assert_eq!(report.get("eth_price").unwrap().merged, 0);
    assert_eq!(report.get("eth_supply").unwrap().merged, 1095);
    assert_eq!(report.get("exchange_reserve").unwrap().merged, 1095);
    assert_eq!(report.get("blob_data").unwrap().origin, Origin::Unavailable);

    // Estimates are the only thing a dead network leaves behind.
    assert_eq!(report.succeeded(), 2);
    assert!(report.outcomes().iter().all(|o| o.error.is_none()));
}
