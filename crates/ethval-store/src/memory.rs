//! In-memory store for testing.
//!
//! `MemoryStore` keeps one map per table keyed by the conflict columns,
//! so upserting the same key twice replaces the row exactly like the real
//! store does. Individual upsert calls can be made to fail, which is how
//! the partial-batch behavior of the batcher is tested.

use crate::{Direction, Query, Row, Store, StoreError};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MemoryState {
    /// table -> (encoded conflict key -> row)
    tables: HashMap<String, BTreeMap<String, Row>>,
    /// Number of upsert calls seen so far.
    upsert_calls: usize,
    /// 1-based upsert call numbers that fail.
    failing_calls: HashSet<usize>,
    /// Tables whose every upsert fails.
    failing_tables: HashSet<String>,
}

/// In-memory [`Store`].
///
/// Clones share state.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th upsert call (1-based, counted across all tables) fail
    /// (builder pattern).
    pub fn fail_upsert_call(self, n: usize) -> Self {
        self.lock().failing_calls.insert(n);
        self
    }

    /// Make every upsert into `table` fail (builder pattern).
    pub fn fail_table(self, table: &str) -> Self {
        self.lock().failing_tables.insert(table.to_string());
        self
    }

    /// Preload rows, merging on `conflict` (builder pattern).
    ///
    /// Seeding does not count as an upsert call.
    pub fn with_rows(self, table: &str, conflict: &[&str], rows: Vec<Row>) -> Self {
        {
            let mut state = self.lock();
            let entries = state.tables.entry(table.to_string()).or_default();
            for row in rows {
                entries.insert(encode_key(&row, conflict), row);
            }
        }
        self
    }

    /// All rows of `table`, ordered by conflict key.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    /// Returns true if `table` has no rows.
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Number of upsert calls made so far.
    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store lock poisoned")
    }
}

/// Encode the conflict columns of a row as a map key.
fn encode_key(row: &Row, conflict: &[&str]) -> String {
    conflict
        .iter()
        .map(|c| row.get(*c).map_or_else(|| "null".to_string(), Value::to_string))
        .collect::<Vec<_>>()
        .join("|")
}

/// Ordering for JSON scalars: nulls first, numbers numerically, strings
/// lexicographically (ISO dates sort correctly as strings).
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

impl Store for MemoryStore {
    async fn upsert(&self, table: &str, rows: &[Row], conflict: &[&str]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.upsert_calls += 1;
        let call = state.upsert_calls;

        if state.failing_calls.contains(&call) || state.failing_tables.contains(table) {
            return Err(StoreError::Rejected {
                status: 500,
                message: format!("injected failure on upsert call {call}"),
            });
        }

        if let Some(row) = rows
            .iter()
            .find(|row| conflict.iter().any(|c| row.get(*c).map_or(true, Value::is_null)))
        {
            return Err(StoreError::Rejected {
                status: 400,
                message: format!("row is missing a conflict column: {}", Value::Object(row.clone())),
            });
        }

        let entries = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            entries.insert(encode_key(row, conflict), row.clone());
        }
        Ok(())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut rows = self.rows(&query.table);

        if let Some((column, direction)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        if !query.columns.is_empty() {
            rows = rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .filter(|(k, _)| query.columns.iter().any(|c| c == k))
                        .collect()
                })
                .collect();
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_on_conflict() {
        let store = MemoryStore::new();
        let conflict = ["date"];

        store
            .upsert("t", &[row(json!({"date": "2024-01-01", "v": 1}))], &conflict)
            .await
            .unwrap();
        store
            .upsert("t", &[row(json!({"date": "2024-01-01", "v": 2}))], &conflict)
            .await
            .unwrap();

        let rows = store.rows("t");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["v"], 2);
    }

    #[tokio::test]
    async fn test_composite_conflict_key() {
        let store = MemoryStore::new();
        let conflict = ["date", "chain"];
        let rows = vec![
            row(json!({"date": "2024-01-01", "chain": "Base", "tvl": 1})),
            row(json!({"date": "2024-01-01", "chain": "Linea", "tvl": 2})),
        ];
        store.upsert("t", &rows, &conflict).await.unwrap();
        assert_eq!(store.len("t"), 2);
    }

    #[tokio::test]
    async fn test_missing_conflict_column_is_rejected() {
        let store = MemoryStore::new();
        let result = store
            .upsert("t", &[row(json!({"v": 1}))], &["date"])
            .await;
        assert!(matches!(result, Err(StoreError::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new().fail_upsert_call(2);
        let r = [row(json!({"date": "2024-01-01"}))];
        assert!(store.upsert("t", &r, &["date"]).await.is_ok());
        assert!(store.upsert("t", &r, &["date"]).await.is_err());
        assert!(store.upsert("t", &r, &["date"]).await.is_ok());
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_select_order_limit_columns() {
        let store = MemoryStore::new().with_rows(
            "prices",
            &["date"],
            vec![
                row(json!({"date": "2024-01-02", "close": 2.0, "volume": 5.0})),
                row(json!({"date": "2024-01-01", "close": 1.0, "volume": 5.0})),
                row(json!({"date": "2024-01-03", "close": 3.0, "volume": 5.0})),
            ],
        );

        let rows = store
            .select(
                &Query::table("prices")
                    .columns(&["date", "close"])
                    .order_desc("date")
                    .limit(2),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["date"], "2024-01-03");
        assert_eq!(rows[1]["date"], "2024-01-02");
        assert!(rows[0].get("volume").is_none());
    }

    #[tokio::test]
    async fn test_select_unknown_table_is_empty() {
        let store = MemoryStore::new();
        let rows = store.select(&Query::table("nothing")).await.unwrap();
        assert!(rows.is_empty());
    }
}
