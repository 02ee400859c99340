//! Financial Modeling Prep client for ETF holdings.
//!
//! Resolution takes two calls: the list of available portfolio dates, then
//! the holdings for the most recent one.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use super::client::{ApiClient, FetchError};
use super::source::HoldingsSource;

/// FMP API base URL.
pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v4";

/// FMP API client.
pub struct FmpClient {
    api: ApiClient,
}

impl FmpClient {
    /// Wrap a throttled client configured with `apikey` query auth.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.api.request_count()
    }
}

impl HoldingsSource for FmpClient {
    async fn latest_holdings_date(&self, etf: &str) -> Result<Option<NaiveDate>, FetchError> {
        let body = self
            .api
            .call("etf-holdings/portfolio-date", &[("symbol", etf)])
            .await?;
        Ok(parse_portfolio_dates(&body)?.into_iter().max())
    }

    async fn holdings(&self, etf: &str, as_of: NaiveDate) -> Result<Vec<String>, FetchError> {
        let date_str = as_of.format("%Y-%m-%d").to_string();
        let body = self
            .api
            .call("etf-holdings", &[("symbol", etf), ("date", date_str.as_str())])
            .await?;
        parse_holdings(&body)
    }
}

fn expect_array<'a>(body: &'a Value, what: &str) -> Result<&'a Vec<Value>, FetchError> {
    body.as_array()
        .ok_or_else(|| FetchError::InvalidResponse(format!("{} is not a list: {}", what, body)))
}

/// Parse `[{"date": "YYYY-MM-DD"}, ...]`, skipping unparseable entries.
pub fn parse_portfolio_dates(body: &Value) -> Result<Vec<NaiveDate>, FetchError> {
    let entries = expect_array(body, "portfolio dates")?;
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let raw = entry.get("date").and_then(Value::as_str)?;
            match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    debug!(raw, "skipping unparseable holdings date");
                    None
                }
            }
        })
        .collect())
}

/// Parse holdings into symbols. Entries without a usable `symbol` are skipped.
pub fn parse_holdings(body: &Value) -> Result<Vec<String>, FetchError> {
    let entries = expect_array(body, "holdings")?;
    let mut symbols = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.get("symbol").and_then(Value::as_str).map(str::trim) {
            Some(symbol) if !symbol.is_empty() => symbols.push(symbol.to_string()),
            _ => debug!(%entry, "skipping holding without symbol"),
        }
    }
    Ok(symbols)
}
