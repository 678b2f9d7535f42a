//! ethval-pipeline: Normalization, quality filtering, fallback synthesis
//! and orchestration for the ETHval collector.
//!
//! This crate provides the [`Collector`], which drives every dataset of
//! the [`datasets`] table through the same path:
//!
//! ```text
//! fetch ──► normalize ──► filter ──► upsert
//!   │ (nothing)              ▲
//!   └──► derive / estimate ──┘
//! ```
//!
//! # Overview
//!
//! - [`normalize()`] interprets a declarative [`SeriesSpec`]: where rows live,
//!   how they are dated, and ordered candidate key-paths per column.
//! - [`filter`] drops records that break range, positivity, day-over-day
//!   or recency rules, then deduplicates on the conflict key.
//! - [`fallback`] derives records from stored datasets or generates a
//!   deterministic trend estimate, tagged so it never passes for
//!   observed data.
//! - [`Collector`] runs tasks sequentially with pacing and folds their
//!   outcomes into a [`RunReport`].
//!
//! # Example
//!
//! ```rust
//! use ethval_ingestion::{FetchPolicy, Fetcher, MockHttp};
//! use ethval_pipeline::{datasets, Collector, CollectorConfig};
//! use ethval_store::MemoryStore;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let http = MockHttp::new().with_json(
//!         "https://api.binance.com/api/v3/klines?symbol=ETHUSDT",
//!         json!([[1700000000000i64, "2000", "2100", "1950", "2050", "350000"]]),
//!     );
//!     let fetcher = Fetcher::new(http, FetchPolicy::default().with_base_backoff(Duration::ZERO));
//!     let store = MemoryStore::new();
//!     let collector = Collector::new(fetcher, store.clone(), CollectorConfig::default().without_pauses());
//!
//!     let task = datasets::by_name("eth_price").unwrap();
//!     let report = collector.run(&[task]).await;
//!
//!     assert_eq!(report.get("eth_price").unwrap().merged, 1);
//!     assert_eq!(store.len("historical_eth_price"), 1);
//! }
//! ```

pub mod coerce;
mod collector;
pub mod datasets;
mod error;
pub mod extract;
pub mod fallback;
pub mod filter;
pub mod normalize;
mod report;
mod task;

pub use collector::{Collector, CollectorConfig};
pub use error::PipelineError;
pub use fallback::{Anchor, Derivation, TrendSpec};
pub use filter::{FilterRules, FilterStats, Rule};
pub use normalize::{normalize, FieldSpec, NormalizeContext, SeriesSpec};
pub use report::{Origin, RunReport, TaskOutcome};
pub use task::{Augment, Fallback, Fetch, Pacing, Source, Task};
