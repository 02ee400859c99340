//! Ticker universe expansion and per-cycle deduplication.
//!
//! Configured entries are either plain symbols or ETFs marked with a `.ETF`
//! suffix (`SPY.ETF`). ETFs expand into their latest constituents; every
//! symbol enters the cycle at most once no matter how many ETFs hold it.

use std::collections::HashSet;
use std::fmt;

use tracing::{info, warn};

use crate::data::{FetchError, HoldingsSnapshot, HoldingsSource};

/// Suffix marking a configured entry as an ETF to expand.
pub const ETF_SUFFIX: &str = ".ETF";

/// One configured universe entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniverseEntry {
    Ticker(String),
    Etf(String),
}

impl UniverseEntry {
    /// Parse `AAPL` or `SPY.ETF` (suffix is case-insensitive). Blank input is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }
        match symbol.strip_suffix(ETF_SUFFIX) {
            Some(etf) if !etf.is_empty() => Some(Self::Etf(etf.to_string())),
            Some(_) => None,
            None => Some(Self::Ticker(symbol)),
        }
    }

    /// Parse a list of raw entries, dropping blanks.
    pub fn parse_all<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<Self> {
        raw.into_iter().filter_map(Self::parse).collect()
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Ticker(s) | Self::Etf(s) => s,
        }
    }
}

impl fmt::Display for UniverseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticker(s) => f.write_str(s),
            Self::Etf(s) => write!(f, "{}{}", s, ETF_SUFFIX),
        }
    }
}

/// Ordered set of symbols to process in one cycle.
#[derive(Debug, Clone, Default)]
pub struct TickerUniverse {
    seen: HashSet<String>,
    order: Vec<String>,
}

impl TickerUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol unless already present. Returns whether it was added.
    pub fn enqueue(&mut self, symbol: &str) -> bool {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() || !self.seen.insert(symbol.clone()) {
            return false;
        }
        self.order.push(symbol);
        true
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.seen.contains(&symbol.trim().to_uppercase())
    }

    pub fn tickers(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Result of expanding the configured entries.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub universe: TickerUniverse,
    pub etfs_resolved: usize,
    pub etfs_skipped: Vec<String>,
}

/// Resolve an ETF to its latest holdings snapshot.
///
/// `Ok(None)` when the provider reports no holdings dates.
pub async fn resolve_etf<H: HoldingsSource>(
    source: &H,
    etf: &str,
) -> Result<Option<HoldingsSnapshot>, FetchError> {
    let Some(as_of) = source.latest_holdings_date(etf).await? else {
        return Ok(None);
    };
    let constituents = source.holdings(etf, as_of).await?;
    Ok(Some(HoldingsSnapshot {
        etf: etf.to_string(),
        as_of,
        constituents,
    }))
}

/// Expand entries into a deduplicated universe, resolving ETFs in order.
///
/// An ETF that cannot be resolved contributes nothing this cycle.
pub async fn expand_universe<H: HoldingsSource>(entries: &[UniverseEntry], source: &H) -> Expansion {
    let mut expansion = Expansion::default();

    for entry in entries {
        match entry {
            UniverseEntry::Ticker(symbol) => {
                expansion.universe.enqueue(symbol);
            }
            UniverseEntry::Etf(etf) => match resolve_etf(source, etf).await {
                Ok(Some(snapshot)) => {
                    let added = snapshot
                        .constituents
                        .iter()
                        .filter(|symbol| expansion.universe.enqueue(symbol))
                        .count();
                    info!(
                        etf = %etf,
                        as_of = %snapshot.as_of,
                        holdings = snapshot.constituents.len(),
                        added,
                        "resolved ETF holdings"
                    );
                    expansion.etfs_resolved += 1;
                }
                Ok(None) => {
                    warn!(etf = %etf, "no holdings date found, skipping ETF this cycle");
                    expansion.etfs_skipped.push(etf.clone());
                }
                Err(e) => {
                    warn!(etf = %etf, error = %e, "failed to resolve ETF, skipping this cycle");
                    expansion.etfs_skipped.push(etf.clone());
                }
            },
        }
    }

    expansion
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory holdings provider.
    #[derive(Default)]
    pub(crate) struct StaticHoldings {
        pub(crate) holdings: HashMap<String, Vec<String>>,
        pub(crate) failing: HashSet<String>,
        pub(crate) calls: AtomicUsize,
    }

    impl StaticHoldings {
        pub(crate) fn with(mut self, etf: &str, symbols: &[&str]) -> Self {
            self.holdings
                .insert(etf.to_string(), symbols.iter().map(|s| s.to_string()).collect());
            self
        }

        pub(crate) fn failing(mut self, etf: &str) -> Self {
            self.failing.insert(etf.to_string());
            self
        }
    }

    impl HoldingsSource for StaticHoldings {
        async fn latest_holdings_date(&self, etf: &str) -> Result<Option<NaiveDate>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(etf) {
                return Err(FetchError::Upstream {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self
                .holdings
                .contains_key(etf)
                .then(|| NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()))
        }

        async fn holdings(&self, etf: &str, _as_of: NaiveDate) -> Result<Vec<String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.holdings.get(etf).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_entry_parsing() {
        assert_eq!(
            UniverseEntry::parse("aapl"),
            Some(UniverseEntry::Ticker("AAPL".to_string()))
        );
        assert_eq!(
            UniverseEntry::parse(" SPY.ETF "),
            Some(UniverseEntry::Etf("SPY".to_string()))
        );
        assert_eq!(
            UniverseEntry::parse("qqq.etf"),
            Some(UniverseEntry::Etf("QQQ".to_string()))
        );
        assert_eq!(UniverseEntry::parse(""), None);
        assert_eq!(UniverseEntry::parse(".ETF"), None);
        assert_eq!(UniverseEntry::Etf("SPY".to_string()).to_string(), "SPY.ETF");
    }

    #[test]
    fn test_parse_all_drops_blanks() {
        let entries = UniverseEntry::parse_all("AAPL,,SPY.ETF, ".split(','));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].symbol(), "SPY");
    }

    #[test]
    fn test_enqueue_deduplicates() {
        let mut universe = TickerUniverse::new();
        assert!(universe.enqueue("AAPL"));
        assert!(!universe.enqueue("aapl"));
        assert!(universe.enqueue("MSFT"));
        assert!(!universe.enqueue(" "));
        assert_eq!(universe.tickers(), ["AAPL", "MSFT"]);
        assert!(universe.contains("msft"));
    }

    #[tokio::test]
    async fn test_ticker_and_etf_overlap_processed_once() {
        let source = StaticHoldings::default().with("SPY", &["AAPL", "MSFT"]);
        let entries = UniverseEntry::parse_all(["AAPL", "SPY.ETF"]);

        let expansion = expand_universe(&entries, &source).await;

        assert_eq!(expansion.universe.tickers(), ["AAPL", "MSFT"]);
        assert_eq!(expansion.etfs_resolved, 1);
        assert!(expansion.etfs_skipped.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_etfs_deduplicate() {
        let source = StaticHoldings::default()
            .with("SPY", &["AAPL", "MSFT", "AMZN"])
            .with("QQQ", &["MSFT", "AAPL", "NVDA"]);
        let entries = UniverseEntry::parse_all(["SPY.ETF", "QQQ.ETF", "NVDA"]);

        let expansion = expand_universe(&entries, &source).await;

        assert_eq!(expansion.universe.tickers(), ["AAPL", "MSFT", "AMZN", "NVDA"]);
        assert_eq!(expansion.etfs_resolved, 2);
    }

    #[tokio::test]
    async fn test_unresolvable_etfs_are_skipped() {
        let source = StaticHoldings::default().failing("XLF");
        let entries = UniverseEntry::parse_all(["GLD.ETF", "XLF.ETF", "TSLA"]);

        let expansion = expand_universe(&entries, &source).await;

        assert_eq!(expansion.universe.tickers(), ["TSLA"]);
        assert_eq!(expansion.etfs_resolved, 0);
        assert_eq!(expansion.etfs_skipped, vec!["GLD", "XLF"]);
    }

    #[tokio::test]
    async fn test_resolve_etf_skips_holdings_call_without_date() {
        let source = StaticHoldings::default();
        assert_eq!(resolve_etf(&source, "GLD").await.unwrap(), None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
