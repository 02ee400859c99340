//! Throttled JSON-over-HTTP client shared by the upstream providers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use super::throttle::RateLimiter;

/// Upstream fetch errors.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// How a provider expects its credential.
#[derive(Clone)]
pub enum Auth {
    /// `Authorization: Bearer <token>` header.
    Bearer(String),
    /// Credential sent as a query parameter.
    Query { param: &'static str, value: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::Query { param, .. } => write!(f, "Query({}=***)", param),
        }
    }
}

/// One upstream provider: base URL, credential and call budget.
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: Auth,
    limiter: Arc<RateLimiter>,
    request_count: AtomicU64,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        auth: Auth,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            auth,
            limiter,
            request_count: AtomicU64::new(0),
        })
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    fn url_for(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    /// Throttled GET returning the decoded JSON body.
    ///
    /// Waits on the provider's call budget before sending. Non-2xx statuses
    /// become [`FetchError::Upstream`] with the response body attached.
    pub async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        self.limiter.acquire().await;

        let mut request = self
            .client
            .get(self.url_for(endpoint))
            .header(ACCEPT, "application/json")
            .query(params);
        request = match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Query { param, value } => request.query(&[(*param, value.as_str())]),
        };

        let response = request.send().await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("<unreadable body: {}>", e),
            };
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| FetchError::InvalidResponse(format!("{} from {}: {}", e, endpoint, text)))
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
