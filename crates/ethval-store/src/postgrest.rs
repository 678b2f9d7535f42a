//! PostgREST (Supabase) store client.
//!
//! Upserts are a `POST /rest/v1/{table}?on_conflict=...` with
//! `Prefer: resolution=merge-duplicates`, which PostgREST turns into an
//! `INSERT ... ON CONFLICT DO UPDATE`. Reads are a `GET` with `select`,
//! `order`, `limit` and `offset` query parameters.
//!
//! # Paging
//!
//! PostgREST caps responses (1000 rows by default on Supabase). Reads
//! walk the table in pages of [`PAGE_SIZE`] until a short page comes back
//! or the query's own limit is reached, so derivations see full history.

use crate::{config::StoreConfig, Direction, Query, Row, Store, StoreError};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use url::Url;

/// Rows requested per read page.
const PAGE_SIZE: usize = 1000;

/// [`Store`] implementation over a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    http_client: reqwest::Client,
    rest_url: Url,
    service_key: String,
}

impl PostgrestStore {
    /// Create a client for the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut base = config.url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let rest_url = Url::parse(&base)?.join("rest/v1/")?;

        Ok(Self {
            http_client: reqwest::Client::new(),
            rest_url,
            service_key: config.service_key.clone(),
        })
    }

    /// URL of a table endpoint.
    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        Ok(self.rest_url.join(table)?)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
    }

    /// Build the URL for one page of `query`.
    fn page_url(&self, query: &Query, limit: usize, offset: usize) -> Result<Url, StoreError> {
        let mut url = self.table_url(&query.table)?;
        {
            let mut pairs = url.query_pairs_mut();
            let select = if query.columns.is_empty() {
                "*".to_string()
            } else {
                query.columns.join(",")
            };
            pairs.append_pair("select", &select);
            if let Some((column, direction)) = &query.order_by {
                let dir = match direction {
                    Direction::Ascending => "asc",
                    Direction::Descending => "desc",
                };
                pairs.append_pair("order", &format!("{column}.{dir}"));
            }
            pairs.append_pair("limit", &limit.to_string());
            if offset > 0 {
                pairs.append_pair("offset", &offset.to_string());
            }
        }
        Ok(url)
    }
}

/// Turn a non-success response into [`StoreError::Rejected`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

impl Store for PostgrestStore {
    async fn upsert(&self, table: &str, rows: &[Row], conflict: &[&str]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("on_conflict", &conflict.join(","));

        let request = self
            .authorized(self.http_client.post(url))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);

        check(request.send().await?).await?;
        tracing::debug!("Upserted {} rows into {}", rows.len(), table);
        Ok(())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut rows: Vec<Row> = Vec::new();

        loop {
            let remaining = query.limit.map(|l| l.saturating_sub(rows.len()));
            let page_size = remaining.map_or(PAGE_SIZE, |r| r.min(PAGE_SIZE));
            if page_size == 0 {
                break;
            }

            let url = self.page_url(query, page_size, rows.len())?;
            let response = check(self.authorized(self.http_client.get(url)).send().await?).await?;
            let page: Vec<Row> = response.json().await?;
            let fetched = page.len();
            rows.extend(page);

            if fetched < page_size {
                break;
            }
        }

        tracing::debug!("Selected {} rows from {}", rows.len(), query.table);
        Ok(rows)
    }
}
