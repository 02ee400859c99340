//! One harvest cycle: expand the universe, fetch and normalize every
//! eligible chain, then commit everything in one write.
//!
//! Failure isolation:
//! - an unresolvable ETF contributes no tickers
//! - a failing ticker contributes no records and never stops the others
//! - a failed commit discards the whole cycle; the next cycle retries

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::expirations::{eligible_expirations, DteWindow};
use super::normalize::normalize_chain;
use super::universe::{expand_universe, Expansion, UniverseEntry};
use crate::data::{FetchError, HoldingsSource, OptionRecord, OptionsSource};
use crate::storage::{RecordSink, StorageError};

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("persisting {records} records failed: {source}")]
    Persistence {
        records: usize,
        #[source]
        source: StorageError,
    },
}

/// Records and counters for one ticker.
#[derive(Debug, Clone, Default)]
pub struct TickerHarvest {
    pub symbol: String,
    pub expirations_fetched: usize,
    pub expirations_without_data: usize,
    pub records: Vec<OptionRecord>,
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub tickers_attempted: usize,
    pub tickers_succeeded: usize,
    pub failed_tickers: Vec<String>,
    pub etfs_resolved: usize,
    pub etfs_skipped: Vec<String>,
    pub expirations_fetched: usize,
    pub expirations_without_data: usize,
    pub records_collected: usize,
    pub rows_persisted: u64,
}

/// Drives harvest cycles against an options source, a holdings source and
/// a record sink.
pub struct Harvester<O, H, S> {
    options: O,
    holdings: H,
    sink: S,
    entries: Vec<UniverseEntry>,
    window: DteWindow,
    max_concurrent_tickers: usize,
}

impl<O, H, S> Harvester<O, H, S>
where
    O: OptionsSource + Sync,
    H: HoldingsSource + Sync,
    S: RecordSink + Sync,
{
    pub fn new(options: O, holdings: H, sink: S, entries: Vec<UniverseEntry>, window: DteWindow) -> Self {
        Self {
            options,
            holdings,
            sink,
            entries,
            window,
            max_concurrent_tickers: 1,
        }
    }

    /// Process up to `n` tickers at once (1 = sequential).
    pub fn with_max_concurrent_tickers(mut self, n: usize) -> Self {
        self.max_concurrent_tickers = n.max(1);
        self
    }

    pub fn entries(&self) -> &[UniverseEntry] {
        &self.entries
    }

    pub fn window(&self) -> &DteWindow {
        &self.window
    }

    pub fn options(&self) -> &O {
        &self.options
    }

    pub fn holdings(&self) -> &H {
        &self.holdings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Resolve ETFs and deduplicate the configured entries.
    pub async fn expand(&self) -> Expansion {
        expand_universe(&self.entries, &self.holdings).await
    }

    /// Expirations for `symbol` inside the DTE window.
    pub async fn eligible_for(&self, symbol: &str, now: &DateTime<Tz>) -> Result<Vec<NaiveDate>, FetchError> {
        let all = self.options.expirations(symbol).await?;
        let eligible = eligible_expirations(&all, now, &self.window);
        debug!(
            symbol,
            listed = all.len(),
            eligible = eligible.len(),
            "filtered expirations"
        );
        Ok(eligible)
    }

    /// Fetch and normalize every eligible chain for one ticker.
    ///
    /// The first fetch error abandons the ticker; records gathered so far
    /// are dropped with it.
    pub async fn harvest_ticker(&self, symbol: &str, now: &DateTime<Tz>) -> Result<TickerHarvest, FetchError> {
        let mut harvest = TickerHarvest {
            symbol: symbol.to_string(),
            ..TickerHarvest::default()
        };

        for expiration in self.eligible_for(symbol, now).await? {
            let payload = self.options.chain(symbol, expiration).await?;
            harvest.expirations_fetched += 1;

            let chain = normalize_chain(symbol, expiration, &payload);
            if chain.no_data {
                warn!(symbol, %expiration, "no option data found");
                harvest.expirations_without_data += 1;
                continue;
            }
            harvest.records.extend(chain.into_records());
        }

        Ok(harvest)
    }

    /// Expand the universe and harvest every ticker without persisting.
    pub async fn collect(&self, now: &DateTime<Tz>) -> (Vec<OptionRecord>, CycleReport) {
        let expansion = self.expand().await;
        let mut report = CycleReport {
            tickers_attempted: expansion.universe.len(),
            etfs_resolved: expansion.etfs_resolved,
            etfs_skipped: expansion.etfs_skipped,
            ..CycleReport::default()
        };

        let results: Vec<(String, Result<TickerHarvest, FetchError>)> =
            stream::iter(expansion.universe.tickers().iter().cloned())
                .map(|symbol| async move {
                    let result = self.harvest_ticker(&symbol, now).await;
                    (symbol, result)
                })
                .buffer_unordered(self.max_concurrent_tickers)
                .collect()
                .await;

        let mut records = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(harvest) => {
                    debug!(
                        symbol = %symbol,
                        expirations = harvest.expirations_fetched,
                        records = harvest.records.len(),
                        "ticker harvested"
                    );
                    report.tickers_succeeded += 1;
                    report.expirations_fetched += harvest.expirations_fetched;
                    report.expirations_without_data += harvest.expirations_without_data;
                    records.extend(harvest.records);
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "ticker failed, skipping for this cycle");
                    report.failed_tickers.push(symbol);
                }
            }
        }
        report.failed_tickers.sort();
        report.records_collected = records.len();

        (records, report)
    }

    /// Run one full cycle and commit its records in one write.
    pub async fn run_cycle(&self, now: &DateTime<Tz>) -> Result<CycleReport, HarvestError> {
        let (records, mut report) = self.collect(now).await;

        if !records.is_empty() {
            report.rows_persisted = self
                .sink
                .commit(&records)
                .await
                .map_err(|source| HarvestError::Persistence {
                    records: records.len(),
                    source,
                })?;
        }

        info!(
            tickers = report.tickers_attempted,
            failed = report.failed_tickers.len(),
            etfs_skipped = report.etfs_skipped.len(),
            expirations = report.expirations_fetched,
            rows = report.rows_persisted,
            "harvest cycle complete"
        );
        Ok(report)
    }
}
