//! HTTP adapter for a PostgREST-style relational backend.
//!
//! Tables are exposed under `<base>/rest/v1/<table>`; filters, ordering and
//! limits travel as query-string parameters (`event_year=eq.2026`,
//! `order=marker_id.asc`). Writes ask for the affected rows back with
//! `Prefer: return=representation`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Backend, Filter, Query};
use crate::error::StoreError;

// ============================================================================
// Constants
// ============================================================================

/// Path prefix for table endpoints
const REST_PATH: &str = "rest/v1";

/// HTTP request timeout in seconds.
/// The cache layer imposes no timeout of its own, so this bounds a hung query.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backend client. Clone is cheap - reqwest::Client uses Arc internally.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: Arc<String>,
    api_key: Arc<String>,
    token: Option<Arc<String>>,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            api_key: Arc::new(api_key.to_string()),
            token: None,
        })
    }

    /// Create a client acting as a signed-in user, sharing the connection pool.
    pub fn with_token(&self, token: Arc<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            api_key: Arc::clone(&self.api_key),
            token: Some(token),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, table)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, StoreError> {
        let mut headers = header::HeaderMap::new();
        let invalid = |e: header::InvalidHeaderValue| StoreError::InvalidResponse(format!("Invalid header value: {}", e));
        headers.insert("apikey", header::HeaderValue::from_str(&self.api_key).map_err(invalid)?);
        let bearer = self.token.as_deref().unwrap_or(&self.api_key);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(invalid)?,
        );
        Ok(headers)
    }

    fn request(&self, method: Method, table: &str, params: &[(String, String)]) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .client
            .request(method, self.table_url(table))
            .headers(self.auth_headers()?)
            .header(header::ACCEPT, "application/json")
            .query(params))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, StoreError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::from_status(status, &body))
        }
    }

    /// Send a request, rebuilding it on every attempt, backing off on 429.
    async fn send(&self, build: impl Fn() -> Result<RequestBuilder, StoreError>) -> Result<Response, StoreError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(StoreError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn json_rows(table: &str, response: Response) -> Result<Vec<Value>, StoreError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(Value::Object(row)) => Ok(vec![Value::Object(row)]),
            Ok(other) => Err(StoreError::InvalidResponse(format!(
                "Expected rows from {}, got {}",
                table, other
            ))),
            Err(e) => Err(StoreError::decode(table, e)),
        }
    }
}

#[async_trait]
impl Backend for RestClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        let params = query.to_params();
        let response = self
            .send(|| self.request(Method::GET, &query.table, &params))
            .await?;
        let rows = Self::json_rows(&query.table, response).await?;
        debug!(table = %query.table, count = rows.len(), "Select complete");
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let response = self
            .send(|| {
                Ok(self
                    .request(Method::POST, table, &[])?
                    .header("Prefer", "return=representation")
                    .json(&row))
            })
            .await?;
        Self::json_rows(table, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::InvalidResponse(format!("Insert into {} returned no row", table)))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>, StoreError> {
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_param).collect();
        let response = self
            .send(|| {
                Ok(self
                    .request(Method::PATCH, table, &params)?
                    .header("Prefer", "return=representation")
                    .json(&patch))
            })
            .await?;
        Self::json_rows(table, response).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        // An unfiltered DELETE would wipe the table; PostgREST refuses it too.
        if filters.is_empty() {
            return Err(StoreError::InvalidResponse(format!(
                "Refusing unfiltered delete on {}",
                table
            )));
        }
        let params: Vec<(String, String)> = filters.iter().map(Filter::to_param).collect();
        let response = self
            .send(|| {
                Ok(self
                    .request(Method::DELETE, table, &params)?
                    .header("Prefer", "return=representation"))
            })
            .await?;
        Ok(Self::json_rows(table, response).await?.len() as u64)
    }
}
