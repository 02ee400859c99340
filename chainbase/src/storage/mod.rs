//! Persistence of normalized option records.

pub mod postgres;

use std::future::Future;

use thiserror::Error;

use crate::data::OptionRecord;

pub use postgres::PgOptionStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Destination for one cycle's records.
pub trait RecordSink {
    /// Write all records atomically; nothing is kept if any row fails.
    /// Returns the number of rows written.
    fn commit(&self, records: &[OptionRecord]) -> impl Future<Output = Result<u64, StorageError>> + Send;
}
