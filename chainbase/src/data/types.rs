//! Core data types for harvested options data.
//!
//! These types represent one observation of one contract, shaped to match
//! the `options_chains` table row for row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "c" | "call" => Some(Self::Call),
            "p" | "put" => Some(Self::Put),
            _ => None,
        }
    }

    /// Value stored in the `option_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

/// A single contract observation from one harvest cycle.
///
/// Records are append-only: every cycle writes fresh rows, and the ingestion
/// timestamp is assigned by the database when the row is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRecord {
    /// Underlying symbol (e.g., "AAPL")
    pub symbol: String,

    /// Option expiration date
    pub expiration: NaiveDate,

    /// Option type (call or put)
    pub option_type: OptionType,

    /// Strike price
    pub strike: Decimal,

    /// Time of the last trade, if the contract has ever traded
    pub last_trade: Option<DateTime<Utc>>,

    pub bid: Option<Decimal>,

    pub ask: Option<Decimal>,

    /// Last traded price
    pub last_price: Option<Decimal>,

    pub implied_volatility: Option<f64>,

    /// Trading volume, never negative
    pub volume: i64,

    /// Open interest, never negative
    pub open_interest: i64,
}

/// Normalized contracts for one ticker/expiration pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedChain {
    pub puts: Vec<OptionRecord>,
    pub calls: Vec<OptionRecord>,

    /// Set when the upstream payload carried no option data at all.
    pub no_data: bool,
}

impl NormalizedChain {
    /// Empty chain flagged as missing upstream data.
    pub fn no_data() -> Self {
        Self {
            no_data: true,
            ..Self::default()
        }
    }

    /// Add a record to the appropriate side.
    pub fn add_record(&mut self, record: OptionRecord) {
        match record.option_type {
            OptionType::Call => self.calls.push(record),
            OptionType::Put => self.puts.push(record),
        }
    }

    pub fn len(&self) -> usize {
        self.puts.len() + self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.calls.is_empty()
    }

    /// Puts first, then calls.
    pub fn into_records(self) -> Vec<OptionRecord> {
        let mut records = self.puts;
        records.extend(self.calls);
        records
    }
}

/// Point-in-time constituents of one ETF.
///
/// Consumed within a single cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingsSnapshot {
    pub etf: String,
    pub as_of: NaiveDate,
    pub constituents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(option_type: OptionType, strike: Decimal) -> OptionRecord {
        OptionRecord {
            symbol: "AAPL".to_string(),
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            option_type,
            strike,
            last_trade: None,
            bid: Some(dec!(1.25)),
            ask: Some(dec!(1.35)),
            last_price: None,
            implied_volatility: Some(0.24),
            volume: 10,
            open_interest: 100,
        }
    }

    #[test]
    fn test_option_type_parsing() {
        assert_eq!(OptionType::from_str("call"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("PUT"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("C"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str(" p "), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("straddle"), None);
        assert_eq!(OptionType::Put.as_str(), "put");
    }

    #[test]
    fn test_chain_routes_records_by_type() {
        let mut chain = NormalizedChain::default();
        chain.add_record(record(OptionType::Call, dec!(150)));
        chain.add_record(record(OptionType::Put, dec!(145)));
        chain.add_record(record(OptionType::Put, dec!(140)));

        assert_eq!(chain.calls.len(), 1);
        assert_eq!(chain.puts.len(), 2);
        assert_eq!(chain.len(), 3);
        assert!(!chain.no_data);

        let records = chain.into_records();
        assert_eq!(records[0].option_type, OptionType::Put);
        assert_eq!(records[2].option_type, OptionType::Call);
    }

    #[test]
    fn test_no_data_chain_is_empty() {
        let chain = NormalizedChain::no_data();
        assert!(chain.no_data);
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }
}
