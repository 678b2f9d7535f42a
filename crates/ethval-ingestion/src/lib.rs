//! # ethval-ingestion
//!
//! Resilient HTTP fetching for the ETHval collector.
//!
//! This crate provides an [`HttpClient`] trait abstraction over the HTTP
//! transport and a [`Fetcher`] that layers the retry policy on top of it.
//!
//! ## Design Principles
//!
//! - **Zero-cost async**: Uses native async traits (Rust 1.75+), avoiding
//!   the heap allocations that `async_trait` would require.
//!
//! - **Failures degrade, never abort**: [`Fetcher::fetch`] returns `None`
//!   once retries are exhausted. Callers move on to a fallback or skip the
//!   dataset; one flaky provider never ends the run.
//!
//! - **Testable**: The [`MockHttp`] implementation serves scripted replies
//!   without network calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ethval_ingestion::{FetchPolicy, Fetcher, ReqwestClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Fetcher::new(ReqwestClient::new()?, FetchPolicy::default());
//!
//!     match fetcher
//!         .fetch("https://api.binance.com/api/v3/klines?symbol=ETHUSDT&interval=1d&limit=10")
//!         .await
//!     {
//!         Some(payload) => println!("Got {} klines", payload.as_array().map_or(0, Vec::len)),
//!         None => println!("Source unavailable this run"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Retry Policy
//!
//! Each attempt is bounded by a timeout (30s by default). A timeout, a
//! transport error, a non-2xx status or a body that is not JSON all count
//! as a failed attempt. Between attempts the fetcher sleeps
//! `base_backoff * attempt_number`, so delays grow linearly (2s, 4s, ...).
//! No sleep follows the final attempt.

mod client;
pub mod config;
pub mod error;
mod fetcher;
mod mock;

pub use client::ReqwestClient;
pub use config::FetchPolicy;
pub use error::IngestionError;
pub use fetcher::{redact_url, Fetcher};
pub use mock::{MockHttp, MockReply};

use serde_json::Value;
use std::time::Duration;

/// A completed HTTP exchange.
///
/// `body` is the parsed JSON for successful responses and `Value::Null`
/// for non-success statuses (their bodies are never inspected).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body.
    pub body: Value,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport abstraction.
///
/// This trait defines the single operation the pipeline needs from the
/// network: a GET returning a status and a JSON body. It uses native async
/// syntax (Rust 1.75+) rather than `async_trait` to avoid heap allocations
/// from `Box<dyn Future>`.
///
/// ## Implementors
///
/// - [`ReqwestClient`]: Production implementation using reqwest
/// - [`MockHttp`]: Test implementation with scripted replies
///
/// ## Errors
///
/// Implementations return `Ok` for any response that arrived, whatever its
/// status. `Err` is reserved for exchanges that did not complete: transport
/// failures, timeouts and undecodable bodies.
pub trait HttpClient: Send + Sync {
    /// Issue a GET for `url` with extra `headers`, giving up after `timeout`.
    fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<HttpResponse, IngestionError>> + Send;
}
