//! Government Sandbox API Adapter
//!
//! REST client for the government identity and credit-bureau sandbox,
//! implementing [`CreditBureauPort`].
//!
//! | operation | endpoint | cached |
//! |---|---|---|
//! | verify_aadhaar | `GET /identity/aadhaar/{n}` | yes |
//! | verify_pan | `GET /identity/pan/{n}` | yes |
//! | verify_gst | `GET /business/company/{gst}` | yes |
//! | unpaid_invoices | `GET /business/company/{gst}/unpaid-invoices` | no |
//! | gst_returns | `GET /business/company/{gst}/returns` | yes |
//! | full_verification_check | `POST /verification/full-check` | yes |
//! | credit_evaluate | `POST /external/v1/credit-evaluate` | yes |
//!
//! # Error Handling
//!
//! HTTP failures are mapped to `PortError` variants:
//! - 404 -> `PortError::NotFound`
//! - 401/403 -> `PortError::Unauthorized` (the cached token is dropped)
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - other 4xx -> `PortError::Validation`
//! - timeouts -> `PortError::Timeout`, connection failures -> `PortError::Connection`
//!
//! Only transient variants are retried, with exponential backoff bounded by
//! the adapter's retry policy.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use core_kernel::{
    AdapterConfig, AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError,
    RetryPolicy,
};

use crate::adapters::response_cache::ResponseCache;
use crate::adapters::token_cache::TokenCache;
use crate::normalize::{normalize_invoices, NormalizedInvoices};
use crate::ports::{CreditBureauPort, CreditEvaluationRequest, FullCheckRequest};
use crate::scoring::GstReturnsSummary;

/// Configuration for the government API client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernmentApiConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Timeouts and retry budget
    pub adapter: AdapterConfig,
    /// Trusted lifetime of a bearer token
    pub token_lifetime_secs: u64,
    /// Refresh once less than this remains
    pub token_refresh_margin_secs: u64,
    /// TTL of cached identity and bureau responses
    pub cache_ttl_secs: u64,
}

impl Default for GovernmentApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            username: String::new(),
            password: String::new(),
            adapter: AdapterConfig {
                adapter_id: "government-api".to_string(),
                ..AdapterConfig::default()
            },
            token_lifetime_secs: 14 * 60,
            token_refresh_margin_secs: 60,
            cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the government sandbox
#[derive(Debug)]
pub struct GovernmentApiClient {
    config: GovernmentApiConfig,
    http: Client,
    tokens: TokenCache,
    cache: ResponseCache,
    retry: RetryPolicy,
}

impl GovernmentApiClient {
    /// Builds a client with its own token and response caches
    ///
    /// # Errors
    ///
    /// Returns `PortError::Internal` if the HTTP client cannot be constructed.
    pub fn new(config: GovernmentApiConfig) -> Result<Self, PortError> {
        let http = Client::builder()
            .timeout(config.adapter.timeout())
            .build()
            .map_err(|e| PortError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            tokens: TokenCache::new(
                Duration::from_secs(config.token_lifetime_secs),
                Duration::from_secs(config.token_refresh_margin_secs),
            ),
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
            retry: config.adapter.retry_policy(),
            http,
            config,
        })
    }

    /// Overrides the retry policy (tests use a zero-delay policy)
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn login(&self) -> Result<String, PortError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .form(&[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error("auth/login", self.config.adapter.timeout_ms, e))?;

        let response = check_status(response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortError::transformation(format!("token response: {}", e)))?;
        Ok(body.access_token)
    }

    async fn bearer_token(&self) -> Result<String, PortError> {
        self.tokens.get_or_refresh(|| self.login()).await
    }

    async fn send_once(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PortError> {
        let token = self.bearer_token().await?;
        let mut request = self.http.request(method, self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(path, self.config.adapter.timeout_ms, e))?;

        match check_status(response).await {
            Err(err @ PortError::Unauthorized { .. }) => {
                self.tokens.invalidate().await;
                Err(err)
            }
            Err(err) => Err(err),
            Ok(response) => response
                .json::<Value>()
                .await
                .map_err(|e| PortError::transformation(format!("{}: {}", path, e))),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, PortError> {
        self.retry
            .run(path, || self.send_once(reqwest::Method::GET, path, None))
            .await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, PortError> {
        self.retry
            .run(path, || self.send_once(reqwest::Method::POST, path, Some(body)))
            .await
    }

    async fn cached_get(&self, cache_key: String, path: &str) -> Result<Value, PortError> {
        if let Some(hit) = self.cache.get(&cache_key).await {
            return Ok(hit);
        }
        let value = self.get(path).await?;
        self.cache.put(cache_key, value.clone()).await;
        Ok(value)
    }

    async fn cached_post(
        &self,
        cache_key: String,
        path: &str,
        body: &Value,
    ) -> Result<Value, PortError> {
        if let Some(hit) = self.cache.get(&cache_key).await {
            return Ok(hit);
        }
        let value = self.post(path, body).await?;
        self.cache.put(cache_key, value.clone()).await;
        Ok(value)
    }
}

async fn check_status(response: Response) -> Result<Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::NOT_FOUND => PortError::not_found("government resource", url),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: format!("{} returned {}", url, status),
        },
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(1),
        },
        s if s.is_server_error() => PortError::ServiceUnavailable {
            service: format!("government api {} ({})", url, s),
        },
        s => PortError::validation(format!("{} returned {}: {}", url, s, body)),
    })
}

fn map_transport_error(operation: &str, timeout_ms: u64, err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::timeout(operation, timeout_ms)
    } else if err.is_connect() || err.is_request() {
        PortError::Connection {
            message: format!("{}: {}", operation, err),
            source: Some(Box::new(err)),
        }
    } else {
        PortError::Internal {
            message: format!("{}: {}", operation, err),
            source: Some(Box::new(err)),
        }
    }
}

fn to_body<T: Serialize>(request: &T) -> Result<Value, PortError> {
    serde_json::to_value(request).map_err(|e| PortError::transformation(e.to_string()))
}

/// Counts FILED entries in `{"returns": [...]}` or a bare array
fn summarize_returns(payload: &Value) -> GstReturnsSummary {
    let entries = match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("returns")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[][..],
    };
    let filed = entries
        .iter()
        .filter(|r| r.get("status").and_then(Value::as_str) == Some("FILED"))
        .count();
    GstReturnsSummary {
        filed: filed as u32,
        total: entries.len() as u32,
    }
}

fn extract_score(payload: &Value) -> Option<Decimal> {
    match payload.get("score")? {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

impl DomainPort for GovernmentApiClient {}

#[async_trait]
impl CreditBureauPort for GovernmentApiClient {
    async fn verify_aadhaar(&self, aadhaar_number: &str) -> Result<Value, PortError> {
        let path = format!("/identity/aadhaar/{}", aadhaar_number);
        let data = self.cached_get(format!("aadhaar:{}", aadhaar_number), &path).await?;
        tracing::info!("gov_api.aadhaar_verified");
        Ok(data)
    }

    async fn verify_pan(&self, pan_number: &str) -> Result<Value, PortError> {
        let data = self
            .cached_get(format!("pan:{}", pan_number), &format!("/identity/pan/{}", pan_number))
            .await?;
        tracing::info!("gov_api.pan_verified");
        Ok(data)
    }

    async fn verify_gst(&self, gst_number: &str) -> Result<Value, PortError> {
        let data = self
            .cached_get(format!("gst:{}", gst_number), &format!("/business/company/{}", gst_number))
            .await?;
        tracing::info!(gst = gst_number, "gov_api.gst_verified");
        Ok(data)
    }

    async fn unpaid_invoices(&self, gst_number: &str) -> Result<NormalizedInvoices, PortError> {
        let payload = self
            .get(&format!("/business/company/{}/unpaid-invoices", gst_number))
            .await?;
        normalize_invoices(gst_number, &payload, Utc::now())
            .map_err(|e| PortError::transformation(e.to_string()))
    }

    async fn gst_returns(&self, gst_number: &str) -> Result<GstReturnsSummary, PortError> {
        let path = format!("/business/company/{}/returns", gst_number);
        let payload = self.cached_get(format!("returns:{}", gst_number), &path).await?;
        Ok(summarize_returns(&payload))
    }

    async fn full_verification_check(
        &self,
        request: &FullCheckRequest,
    ) -> Result<Value, PortError> {
        let key = format!(
            "full_check:{}:{}:{}:{}",
            request.aadhaar_number,
            request.pan_number,
            request.gst_number,
            request.invoice_number.as_deref().unwrap_or("None")
        );
        let body = to_body(request)?;
        let data = self.cached_post(key, "/verification/full-check", &body).await?;
        tracing::info!(gst = %request.gst_number, "gov_api.full_check_complete");
        Ok(data)
    }

    async fn credit_evaluate(
        &self,
        request: &CreditEvaluationRequest,
    ) -> Result<Option<Decimal>, PortError> {
        let body = to_body(request)?;
        let key = format!("credit_eval:{}", request.gst_number);
        let data = self.cached_post(key, "/external/v1/credit-evaluate", &body).await?;
        tracing::info!(gst = %request.gst_number, "gov_api.credit_evaluated");
        Ok(extract_score(&data))
    }
}

#[async_trait]
impl HealthCheckable for GovernmentApiClient {
    /// Healthy if a bearer token can be obtained
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = self.bearer_token().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(_) => (AdapterHealth::Healthy, None),
            Err(e) if e.is_transient() => (AdapterHealth::Degraded, Some(e.to_string())),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };
        HealthCheckResult {
            adapter_id: self.config.adapter.adapter_id.clone(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}
