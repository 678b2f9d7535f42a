//! Resilient fetcher: timeout, linear backoff, and a definitive `None`.

use crate::{config::FetchPolicy, error::IngestionError, HttpClient};
use serde_json::Value;
use url::Url;

/// Query parameters whose values never reach the logs.
const SECRET_PARAMS: &[&str] = &["apikey", "api_key", "key", "token"];

/// Fetches JSON payloads under a [`FetchPolicy`].
///
/// # Example
///
/// ```rust
/// use ethval_ingestion::{FetchPolicy, Fetcher, MockHttp};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockHttp::new().with_json("https://example.test/a", json!([1, 2, 3]));
///     let fetcher = Fetcher::new(mock, FetchPolicy::default());
///
///     let payload = fetcher.fetch("https://example.test/a").await;
///     assert_eq!(payload, Some(json!([1, 2, 3])));
/// }
/// ```
pub struct Fetcher<C> {
    client: C,
    policy: FetchPolicy,
}

impl<C: HttpClient> Fetcher<C> {
    /// Create a fetcher over `client`.
    pub fn new(client: C, policy: FetchPolicy) -> Self {
        Self { client, policy }
    }

    /// Fetch `url` and return its JSON body, or `None` once every attempt
    /// has failed.
    pub async fn fetch(&self, url: &str) -> Option<Value> {
        let attempts = self.policy.attempts();
        let shown = redact_url(url);

        for attempt in 0..attempts {
            match self.attempt(url).await {
                Ok(body) => {
                    tracing::debug!("Fetched {} on attempt {}", shown, attempt + 1);
                    return Some(body);
                }
                Err(err) => {
                    tracing::warn!(
                        "Fetch attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        attempts,
                        shown,
                        err
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        tracing::warn!("Giving up on {} after {} attempts", shown, attempts);
        None
    }

    /// One bounded attempt. The timeout is enforced here as well as passed
    /// to the client, so a client that ignores it still cannot hang the run.
    async fn attempt(&self, url: &str) -> Result<Value, IngestionError> {
        let response = tokio::time::timeout(
            self.policy.timeout,
            self.client.get(url, &[], self.policy.timeout),
        )
        .await
        .map_err(|_| IngestionError::Timeout)??;

        if !response.is_success() {
            return Err(IngestionError::Status(response.status));
        }
        Ok(response.body)
    }
}

/// Mask secret query parameters (API keys) so URLs can be logged.
///
/// Unparseable input is returned unchanged.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if url.query().is_none() {
        return raw.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let hidden = SECRET_PARAMS.iter().any(|s| k.eq_ignore_ascii_case(s));
            let v = if hidden { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
