//! ethval-collector: daily collection job for the ETHval datasets.
//!
//! Loads configuration from the environment, runs every dataset task in
//! order and prints the run summary. Individual dataset failures are
//! reported in the summary; only missing credentials or a broken HTTP
//! client end the process with a non-zero exit.

use anyhow::Context;
use ethval_ingestion::{FetchPolicy, Fetcher, ReqwestClient};
use ethval_pipeline::{datasets, Collector, CollectorConfig};
use ethval_store::{PostgrestStore, StoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ethval_collector=info,ethval_pipeline=info,ethval_store=info,ethval_ingestion=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store_config = StoreConfig::from_env().context("store credentials")?;
    let store = PostgrestStore::new(&store_config).context("store client")?;

    let policy = FetchPolicy::from_env();
    let fetcher = Fetcher::new(ReqwestClient::new().context("http client")?, policy);

    let config = CollectorConfig::from_env();
    if config.etherscan_api_key.is_none() {
        tracing::info!("ETHERSCAN_API_KEY not set, gas utilization will be left empty");
    }

    let collector = Collector::new(fetcher, store, config);
    let tasks = datasets::all();
    tracing::info!(
        "Collecting {} datasets for {}",
        tasks.len(),
        collector.run_date()
    );

    let report = collector.run(&tasks).await;
    println!("{report}");

    Ok(())
}
