//! Tradier market-data client for option expirations and chains.
//!
//! API quirks handled here:
//! - `expirations` is `null` for symbols without listed options
//! - a single expiration is returned as a bare string instead of an array

use chrono::NaiveDate;
use serde_json::Value;

use super::client::{ApiClient, FetchError};
use super::source::OptionsSource;

/// Tradier API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.tradier.com/v1";

/// Tradier API client.
pub struct TradierClient {
    api: ApiClient,
}

impl TradierClient {
    /// Wrap a throttled client configured with bearer auth.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.api.request_count()
    }
}

impl OptionsSource for TradierClient {
    async fn expirations(&self, symbol: &str) -> Result<Vec<String>, FetchError> {
        let body = self
            .api
            .call("markets/options/expirations", &[("symbol", symbol)])
            .await?;
        Ok(parse_expirations(&body))
    }

    async fn chain(&self, symbol: &str, expiration: NaiveDate) -> Result<Value, FetchError> {
        let date_str = expiration.format("%Y-%m-%d").to_string();
        let params = [
            ("symbol", symbol),
            ("expiration", date_str.as_str()),
            ("greeks", "true"),
        ];
        self.api.call("markets/options/chains", &params).await
    }
}

/// Extract expiration date strings from an expirations response.
pub fn parse_expirations(body: &Value) -> Vec<String> {
    match body.get("expirations").and_then(|e| e.get("date")) {
        Some(Value::Array(dates)) => dates
            .iter()
            .filter_map(|d| d.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(date)) => vec![date.clone()],
        _ => Vec::new(),
    }
}
