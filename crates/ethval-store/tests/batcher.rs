//! Upsert batcher behavior against the in-memory store.

use chrono::{Days, NaiveDate};
use ethval_store::{MemoryStore, UpsertBatcher};
use ethval_types::{DatasetDescriptor, Provenance, Record};

fn descriptor() -> DatasetDescriptor {
    DatasetDescriptor::new("ethereum_tvl", "historical_ethereum_tvl", &["tvl"])
}

fn records(n: u64) -> Vec<Record> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..n)
        .map(|i| {
            Record::new(
                start.checked_add_days(Days::new(i)).unwrap(),
                Provenance::Observed("defillama"),
            )
            .with_field("tvl", 1_000.0 + i as f64)
        })
        .collect()
}

#[tokio::test]
async fn test_partial_chunk_failure_counts_surviving_chunks() {
    // 1200 records -> chunks of 500, 500, 200; the second one fails.
    let store = MemoryStore::new().fail_upsert_call(2);
    let saved = UpsertBatcher::default()
        .upsert(&store, &descriptor(), &records(1200))
        .await;

    assert_eq!(saved, 700);
    assert_eq!(store.upsert_calls(), 3);
    assert_eq!(store.len("historical_ethereum_tvl"), 700);
}

#[tokio::test]
async fn test_all_chunks_fail() {
    let store = MemoryStore::new().fail_table("historical_ethereum_tvl");
    let saved = UpsertBatcher::default()
        .upsert(&store, &descriptor(), &records(10))
        .await;
    assert_eq!(saved, 0);
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let store = MemoryStore::new();
    let batch = records(750);
    let batcher = UpsertBatcher::default();

    assert_eq!(batcher.upsert(&store, &descriptor(), &batch).await, 750);
    let once = store.rows("historical_ethereum_tvl");

    assert_eq!(batcher.upsert(&store, &descriptor(), &batch).await, 750);
    let twice = store.rows("historical_ethereum_tvl");

    assert_eq!(once, twice);
    assert_eq!(twice.len(), 750);
}

#[tokio::test]
async fn test_unconvertible_records_are_skipped() {
    let store = MemoryStore::new();
    let mut batch = records(3);
    batch[1].set("tvl", f64::INFINITY);

    let saved = UpsertBatcher::new(2)
        .upsert(&store, &descriptor(), &batch)
        .await;
    assert_eq!(saved, 2);
    assert_eq!(store.upsert_calls(), 1);
}

#[tokio::test]
async fn test_empty_batch_makes_no_calls() {
    let store = MemoryStore::new();
    let saved = UpsertBatcher::default()
        .upsert(&store, &descriptor(), &[])
        .await;
    assert_eq!(saved, 0);
    assert_eq!(store.upsert_calls(), 0);
}
