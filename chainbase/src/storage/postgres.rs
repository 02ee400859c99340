//! PostgreSQL writer for the `options_chains` table.
//!
//! Rows are appended with multi-row INSERTs inside a single transaction per
//! commit. Dropping the transaction on error rolls everything back.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{RecordSink, StorageError};
use crate::data::OptionRecord;

/// Rows per INSERT statement (11 binds each, under the 65535 bind limit).
const INSERT_CHUNK_ROWS: usize = 1000;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS options_chains (
        id BIGSERIAL PRIMARY KEY,
        symbol VARCHAR(16) NOT NULL,
        expiration DATE NOT NULL,
        option_type VARCHAR(4) NOT NULL CHECK (option_type IN ('put', 'call')),
        strike NUMERIC(14, 4) NOT NULL,
        last_trade_date TIMESTAMPTZ,
        bid NUMERIC(14, 4),
        ask NUMERIC(14, 4),
        last_price NUMERIC(14, 4),
        implied_volatility DOUBLE PRECISION,
        volume BIGINT NOT NULL DEFAULT 0 CHECK (volume >= 0),
        open_interest BIGINT NOT NULL DEFAULT 0 CHECK (open_interest >= 0),
        ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS options_chains_symbol_expiration_idx
        ON options_chains (symbol, expiration)
"#;

/// Option record store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgOptionStore {
    pool: PgPool,
}

impl PgOptionStore {
    /// Connect a pool and verify the database is reachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the table and index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        info!("options_chains schema ready");
        Ok(())
    }
}

impl RecordSink for PgOptionStore {
    async fn commit(&self, records: &[OptionRecord]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let result = insert_statement(chunk).build().execute(&mut *tx).await?;
            written += result.rows_affected();
            debug!(rows = chunk.len(), "inserted chunk");
        }

        tx.commit().await?;
        Ok(written)
    }
}

fn insert_statement(chunk: &[OptionRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO options_chains (symbol, expiration, option_type, strike, last_trade_date, \
         bid, ask, last_price, implied_volatility, volume, open_interest) ",
    );

    builder.push_values(chunk, |mut b, record| {
        b.push_bind(record.symbol.as_str())
            .push_bind(record.expiration)
            .push_bind(record.option_type.as_str())
            .push_bind(record.strike)
            .push_bind(record.last_trade)
            .push_bind(record.bid)
            .push_bind(record.ask)
            .push_bind(record.last_price)
            .push_bind(record.implied_volatility)
            .push_bind(record.volume)
            .push_bind(record.open_interest);
    });

    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OptionType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(strike: rust_decimal::Decimal) -> OptionRecord {
        OptionRecord {
            symbol: "SPY".to_string(),
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            option_type: OptionType::Call,
            strike,
            last_trade: None,
            bid: Some(dec!(4.1)),
            ask: Some(dec!(4.3)),
            last_price: Some(dec!(4.2)),
            implied_volatility: Some(0.14),
            volume: 250,
            open_interest: 1_900,
        }
    }

    #[test]
    fn test_insert_statement_binds_every_column() {
        let records = vec![record(dec!(500)), record(dec!(505)), record(dec!(510))];
        let builder = insert_statement(&records);
        let sql = builder.sql();

        assert!(sql.starts_with("INSERT INTO options_chains (symbol, expiration"));
        assert!(sql.contains("VALUES ($1, $2, $3"));
        assert!(sql.contains("$33)"));
        assert!(!sql.contains("$34"));
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_chunk_size_respects_bind_limit() {
        assert!(INSERT_CHUNK_ROWS * 11 < u16::MAX as usize);
    }

    #[test]
    fn test_schema_has_identity_and_ingestion_default() {
        assert!(CREATE_TABLE.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(CREATE_TABLE.contains("ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
    }
}
