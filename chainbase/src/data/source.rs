//! Upstream seams used by the harvester.

use std::future::Future;

use chrono::NaiveDate;
use serde_json::Value;

use super::client::FetchError;

/// Option expirations and chains for an underlying.
pub trait OptionsSource {
    /// Raw expiration dates (`YYYY-MM-DD`) in provider order.
    fn expirations(&self, symbol: &str) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;

    /// Raw chain payload for one expiration.
    fn chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// ETF holdings snapshots.
pub trait HoldingsSource {
    /// Most recent as-of date, or `None` when the provider has no dates.
    fn latest_holdings_date(
        &self,
        etf: &str,
    ) -> impl Future<Output = Result<Option<NaiveDate>, FetchError>> + Send;

    /// Constituent symbols as of `as_of`, in provider order.
    fn holdings(
        &self,
        etf: &str,
        as_of: NaiveDate,
    ) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;
}
