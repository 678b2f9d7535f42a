//! Production HTTP client backed by reqwest.

use crate::{error::IngestionError, HttpClient, HttpResponse};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;

/// User agent sent with every request. Several providers reject
/// requests without one.
const USER_AGENT: &str = concat!("ethval-collector/", env!("CARGO_PKG_VERSION"));

/// [`HttpClient`] implementation using a shared `reqwest::Client`.
///
/// The client pools connections internally, so one instance should be
/// reused for the whole run.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    http_client: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with the collector's user agent.
    pub fn new() -> Result<Self, IngestionError> {
        let http_client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http_client })
    }
}

impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, IngestionError> {
        let mut request = self
            .http_client
            .get(url)
            .timeout(timeout)
            .header(ACCEPT, "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Ok(HttpResponse {
                status: status.as_u16(),
                body: Value::Null,
            });
        }

        let body: Value = response.json().await?;
        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}
