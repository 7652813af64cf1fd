//! HTTP transport underneath the auth gateway.
//!
//! The gateway only needs "send this request with this bearer token and
//! give me the status and body". Production uses reqwest; tests use
//! [`mocks::MockTransport`].

use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::domain::CatalogError;

/// HTTP method subset used by catalog calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A transport-agnostic API request. `path` is relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Path plus encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header, if any
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map a non-success status to the error taxonomy.
    pub fn into_result(self) -> Result<RawResponse, CatalogError> {
        if self.is_success() {
            return Ok(self);
        }
        match CatalogError::from_status(self.status, &self.body) {
            CatalogError::RateLimited { .. } => Err(CatalogError::RateLimited {
                retry_after: self.retry_after,
            }),
            other => Err(other),
        }
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, CatalogError> {
        serde_json::from_str(&self.body).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

/// Sends one HTTP request. Errors are connection-level only; any HTTP
/// status (including 4xx/5xx) comes back as a [`RawResponse`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<RawResponse, CatalogError>;
}

/// reqwest-backed transport with a per-request timeout.
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    base_url: String,
}

/// User agent sent with every request
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

impl ReqwestTransport {
    /// Create a transport for `base_url`.
    ///
    /// Every request is individually time-boxed by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(error: reqwest::Error) -> CatalogError {
        if error.is_timeout() {
            CatalogError::Timeout(error.to_string())
        } else {
            CatalogError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<RawResponse, CatalogError> {
        let url = format!("{}{}", self.base_url, request.path_and_query());
        let mut builder = match request.method {
            Method::Get => self.http_client.get(&url),
            Method::Post => self.http_client.post(&url),
        };
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(Self::map_error)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.map_err(Self::map_error)?;

        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }
}
