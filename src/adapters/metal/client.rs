//! HTTP client for the machine provisioning service.
//!
//! One shared reqwest client per driver; paths are relative to the API
//! base URL and `op`-style operations ride a query parameter. Transient
//! faults (connect errors, timeouts, 5xx) pass through the retry envelope;
//! 4xx and malformed bodies are persistent and surface immediately.

use std::time::Duration;

use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::adapters::retry::RetryPolicy;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::MetalDriverConfig;

/// Form body for create/update calls: field name and serialized value.
pub type Form = [(&'static str, String)];

/// Client for one machine provisioning API endpoint.
#[derive(Debug, Clone)]
pub struct MetalClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl MetalClient {
    /// Build a client from driver configuration.
    pub fn new(config: &MetalDriverConfig) -> DriverResult<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DriverError::usage(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.api_url, config.use_ssl),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_ms),
            ),
        })
    }

    /// The normalized base URL, always ending in a slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }

    /// GET a resource or collection path, returning the parsed body.
    pub async fn get(&self, path: &str) -> DriverResult<Value> {
        let url = self.url(path);
        let url = url.as_str();
        self.retry
            .execute(|| async move {
                debug!(url, "GET");
                let resp = self
                    .authed(self.http.get(url))
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                read_body(resp).await
            })
            .await
    }

    /// POST a form, optionally as a named operation on the path.
    pub async fn post(&self, path: &str, op: Option<&str>, form: &Form) -> DriverResult<Value> {
        let url = self.url(path);
        let url = url.as_str();
        self.retry
            .execute(|| async move {
                debug!(url, op = op.unwrap_or(""), "POST");
                let mut builder = self.authed(self.http.post(url));
                if let Some(op) = op {
                    builder = builder.query(&[("op", op)]);
                }
                let resp = builder
                    .form(form)
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                read_body(resp).await
            })
            .await
    }

    /// PUT a form to a canonical resource path.
    pub async fn put(&self, path: &str, form: &Form) -> DriverResult<Value> {
        let url = self.url(path);
        let url = url.as_str();
        self.retry
            .execute(|| async move {
                debug!(url, "PUT");
                let resp = self
                    .authed(self.http.put(url))
                    .form(form)
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                read_body(resp).await
            })
            .await
    }

    /// DELETE a canonical resource path.
    pub async fn delete(&self, path: &str) -> DriverResult<()> {
        let url = self.url(path);
        let url = url.as_str();
        self.retry
            .execute(|| async move {
                debug!(url, "DELETE");
                let resp = self
                    .authed(self.http.request(Method::DELETE, url))
                    .send()
                    .await
                    .map_err(classify_send_error)?;
                read_body(resp).await.map(|_| ())
            })
            .await
    }

    /// Probe that the service endpoint is reachable at all.
    ///
    /// Resolution, TCP connect, and TLS handshake must succeed; any HTTP
    /// response, authorized or not, counts as connectivity.
    pub async fn test_connectivity(&self) -> DriverResult<()> {
        let url = self.url("version/");
        self.http
            .get(&url)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_send_error)
    }

    /// Probe that the configured credential is accepted.
    pub async fn test_authentication(&self) -> DriverResult<()> {
        self.get("account/").await.map(|_| ())
    }
}

fn normalize_base_url(api_url: &str, use_ssl: bool) -> String {
    let mut url = if api_url.contains("://") {
        api_url.to_string()
    } else {
        let scheme = if use_ssl { "https" } else { "http" };
        format!("{scheme}://{api_url}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Classify a request-level failure. Send failures are reachability
/// problems and retryable; body decode failures are contract breaches.
fn classify_send_error(err: reqwest::Error) -> DriverError {
    if err.is_decode() || err.is_builder() {
        DriverError::persistent(format!("remote contract breach: {err}"))
    } else {
        DriverError::transient(format!("remote unreachable: {err}"))
    }
}

fn classify_status(status: StatusCode, body: &str) -> DriverError {
    let summary: String = body.chars().take(200).collect();
    if status.is_server_error() {
        DriverError::transient(format!("remote returned {status}: {summary}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        DriverError::persistent(format!("authentication rejected ({status})"))
    } else {
        DriverError::persistent(format!("remote returned {status}: {summary}"))
    }
}

async fn read_body(resp: reqwest::Response) -> DriverResult<Value> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| DriverError::transient(format!("failed reading response body: {e}")))?;

    if !status.is_success() {
        return Err(classify_status(status, &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| DriverError::persistent(format!("malformed response body: {e}")))
}
