//! Chain normalization: raw Tradier contracts into [`OptionRecord`]s.
//!
//! Pure function of its input. Contracts missing an option type or strike
//! are dropped one by one; a payload without any option substructure yields
//! an empty chain flagged `no_data`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::data::{NormalizedChain, OptionRecord, OptionType};

/// Partition a chain payload into puts and calls.
pub fn normalize_chain(symbol: &str, expiration: NaiveDate, payload: &Value) -> NormalizedChain {
    let contracts = match payload.get("options").and_then(|o| o.get("option")) {
        Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => return NormalizedChain::no_data(),
    };

    let mut chain = NormalizedChain::default();
    for contract in contracts {
        match to_record(symbol, expiration, contract) {
            Some(record) => chain.add_record(record),
            None => debug!(symbol, %expiration, "skipping malformed contract"),
        }
    }
    chain
}

fn to_record(symbol: &str, expiration: NaiveDate, contract: &Value) -> Option<OptionRecord> {
    let option_type = contract
        .get("option_type")
        .and_then(Value::as_str)
        .and_then(OptionType::from_str)?;
    let strike = decimal_field(contract, "strike")?;

    let implied_volatility = f64_field(contract, "implied_volatility").or_else(|| {
        contract
            .get("greeks")
            .and_then(|g| f64_field(g, "mid_iv"))
    });

    Some(OptionRecord {
        symbol: symbol.to_string(),
        expiration,
        option_type,
        strike,
        last_trade: contract.get("last_trade_date").and_then(parse_timestamp),
        bid: decimal_field(contract, "bid"),
        ask: decimal_field(contract, "ask"),
        last_price: decimal_field(contract, "last"),
        implied_volatility,
        volume: count_field(contract, "volume"),
        open_interest: count_field(contract, "open_interest"),
    })
}

/// Numbers go through their decimal text so `0.1` stays `0.1`.
fn decimal_field(obj: &Value, key: &str) -> Option<Decimal> {
    match obj.get(key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn f64_field(obj: &Value, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative integer count, 0 when absent.
fn count_field(obj: &Value, key: &str) -> i64 {
    let value = match obj.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    value.unwrap_or(0).max(0)
}

/// Epoch milliseconds (0 means never traded) or a timestamp string.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64()?;
            if millis <= 0 {
                return None;
            }
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn expiration() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 16).unwrap()
    }

    fn sample_payload() -> Value {
        json!({
            "options": {
                "option": [
                    {
                        "symbol": "AAPL240216P00180000",
                        "option_type": "put",
                        "strike": 180.0,
                        "last_trade_date": 1706900400000_i64,
                        "bid": 1.25,
                        "ask": 1.5,
                        "last": 1.4,
                        "volume": 1520,
                        "open_interest": 8841,
                        "greeks": {"mid_iv": 0.231}
                    },
                    {
                        "symbol": "AAPL240216C00185000",
                        "option_type": "call",
                        "strike": 185.0,
                        "last_trade_date": 0,
                        "bid": 2.1,
                        "ask": 2.2,
                        "last": null,
                        "implied_volatility": 0.25,
                        "volume": 0,
                        "open_interest": 120
                    }
                ]
            }
        })
    }

    #[test]
    fn test_partitions_puts_and_calls() {
        let chain = normalize_chain("AAPL", expiration(), &sample_payload());
        assert!(!chain.no_data);
        assert_eq!(chain.puts.len(), 1);
        assert_eq!(chain.calls.len(), 1);

        let put = &chain.puts[0];
        assert_eq!(put.symbol, "AAPL");
        assert_eq!(put.expiration, expiration());
        assert_eq!(put.option_type, OptionType::Put);
        assert_eq!(put.strike, dec!(180));
        assert_eq!(put.bid, Some(dec!(1.25)));
        assert_eq!(put.ask, Some(dec!(1.5)));
        assert_eq!(put.last_price, Some(dec!(1.4)));
        assert_eq!(put.implied_volatility, Some(0.231));
        assert_eq!(put.volume, 1520);
        assert_eq!(put.open_interest, 8841);
        assert_eq!(
            put.last_trade,
            Utc.timestamp_millis_opt(1706900400000).single()
        );

        let call = &chain.calls[0];
        assert_eq!(call.strike, dec!(185));
        assert_eq!(call.last_trade, None);
        assert_eq!(call.last_price, None);
        assert_eq!(call.implied_volatility, Some(0.25));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let payload = sample_payload();
        let first = normalize_chain("AAPL", expiration(), &payload);
        let second = normalize_chain("AAPL", expiration(), &payload);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_substructure_is_no_data() {
        for payload in [
            json!({"options": null}),
            json!({"options": {}}),
            json!({}),
            json!({"options": {"option": "garbage"}}),
        ] {
            let chain = normalize_chain("AAPL", expiration(), &payload);
            assert!(chain.no_data);
            assert!(chain.puts.is_empty());
            assert!(chain.calls.is_empty());
        }
    }

    #[test]
    fn test_single_contract_object() {
        let payload = json!({
            "options": {"option": {"option_type": "call", "strike": 100, "volume": 5}}
        });
        let chain = normalize_chain("XYZ", expiration(), &payload);
        assert_eq!(chain.calls.len(), 1);
        assert_eq!(chain.calls[0].volume, 5);
        assert_eq!(chain.calls[0].open_interest, 0);
    }

    #[test]
    fn test_malformed_contracts_are_skipped() {
        let payload = json!({
            "options": {"option": [
                {"option_type": "put", "strike": 50.0},
                {"option_type": "straddle", "strike": 50.0},
                {"option_type": "call"},
                {"strike": 55.0},
                {"option_type": "call", "strike": "55.5"}
            ]}
        });
        let chain = normalize_chain("XYZ", expiration(), &payload);
        assert!(!chain.no_data);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.calls[0].strike, dec!(55.5));
    }

    #[test]
    fn test_counts_are_clamped_non_negative() {
        let payload = json!({
            "options": {"option": [
                {"option_type": "put", "strike": 10, "volume": -3, "open_interest": null}
            ]}
        });
        let chain = normalize_chain("XYZ", expiration(), &payload);
        assert_eq!(chain.puts[0].volume, 0);
        assert_eq!(chain.puts[0].open_interest, 0);
    }

    #[test]
    fn test_string_timestamps() {
        assert_eq!(
            parse_timestamp(&json!("2024-02-02 15:30:00")),
            Utc.with_ymd_and_hms(2024, 2, 2, 15, 30, 0).single()
        );
        assert_eq!(
            parse_timestamp(&json!("2024-02-02T15:30:00-05:00")),
            Utc.with_ymd_and_hms(2024, 2, 2, 20, 30, 0).single()
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn test_empty_option_list_is_not_no_data() {
        let chain = normalize_chain("XYZ", expiration(), &json!({"options": {"option": []}}));
        assert!(!chain.no_data);
        assert!(chain.is_empty());
    }
}
