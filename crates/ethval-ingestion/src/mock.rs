//! Mock HTTP client for testing.
//!
//! `MockHttp` implements `HttpClient` with scripted replies, allowing
//! tests to run without network calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ethval_ingestion::{MockHttp, MockReply};
//!
//! let mock = MockHttp::new()
//!     .with_json("https://api.llama.fi/v2/historicalChainTvl/Ethereum", json!([]))
//!     .with_sequence("https://flaky.test/", vec![MockReply::Status(503), MockReply::Json(json!(1))]);
//! ```
//!
//! Routes match by prefix; the longest matching route wins. URLs with no
//! route get a 404.

use crate::{error::IngestionError, HttpClient, HttpResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// 200 with this body.
    Json(Value),
    /// This status with an empty body.
    Status(u16),
    /// The attempt times out.
    Timeout,
    /// 200 with a body that is not JSON.
    Malformed,
}

#[derive(Debug, Default)]
struct Route {
    replies: Vec<MockReply>,
    /// Index of the next reply; the last reply repeats forever.
    cursor: usize,
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, Route>,
    calls: Vec<String>,
}

/// Mock HTTP client for testing.
///
/// Clones share state, so a test can keep a handle for call assertions
/// after moving the mock into a fetcher.
#[derive(Debug, Default, Clone)]
pub struct MockHttp {
    state: Arc<Mutex<MockState>>,
}

impl MockHttp {
    /// Create a mock with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `prefix` with `body` (builder pattern).
    pub fn with_json(self, prefix: &str, body: Value) -> Self {
        self.with_sequence(prefix, vec![MockReply::Json(body)])
    }

    /// Always answer `prefix` with `status` (builder pattern).
    pub fn with_status(self, prefix: &str, status: u16) -> Self {
        self.with_sequence(prefix, vec![MockReply::Status(status)])
    }

    /// Answer `prefix` with `replies` in order, repeating the last one
    /// (builder pattern).
    pub fn with_sequence(self, prefix: &str, replies: Vec<MockReply>) -> Self {
        self.lock().routes.insert(
            prefix.to_string(),
            Route {
                replies,
                cursor: 0,
            },
        );
        self
    }

    /// Every URL requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    fn next_reply(&self, url: &str) -> Option<MockReply> {
        let mut state = self.lock();
        state.calls.push(url.to_string());

        let prefix = state
            .routes
            .keys()
            .filter(|prefix| url.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())?
            .clone();

        let route = state.routes.get_mut(&prefix)?;
        let reply = route.replies.get(route.cursor).or(route.replies.last())?.clone();
        if route.cursor < route.replies.len() {
            route.cursor += 1;
        }
        Some(reply)
    }
}

impl HttpClient for MockHttp {
    async fn get(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
        _timeout: Duration,
    ) -> Result<HttpResponse, IngestionError> {
        match self.next_reply(url) {
            Some(MockReply::Json(body)) => Ok(HttpResponse { status: 200, body }),
            Some(MockReply::Status(status)) => Ok(HttpResponse {
                status,
                body: Value::Null,
            }),
            Some(MockReply::Timeout) => Err(IngestionError::Timeout),
            Some(MockReply::Malformed) => Err(IngestionError::Decode(
                "expected value at line 1 column 1".to_string(),
            )),
            None => Ok(HttpResponse {
                status: 404,
                body: Value::Null,
            }),
        }
    }
}
