//! Harvester configuration.
//!
//! Loaded from a TOML file; every section is optional and falls back to
//! defaults. Credentials never live in the file and are read from the
//! environment instead:
//! - `TRADIER_API_KEY`
//! - `FMP_API_KEY`
//! - `DATABASE_URL` (overrides `[database] url`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{fmp, tradier};
use crate::harvest::{DteWindow, TradingHours, UniverseEntry};

pub const TRADIER_API_KEY: &str = "TRADIER_API_KEY";
pub const FMP_API_KEY: &str = "FMP_API_KEY";
pub const DATABASE_URL: &str = "DATABASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid DTE window [{min_dte}, {max_dte}]: need 0 <= min_dte <= max_dte")]
    InvalidWindow { min_dte: i64, max_dte: i64 },

    #[error("invalid trading hours [{open_hour}, {close_hour})")]
    InvalidTradingHours { open_hour: u32, close_hour: u32 },

    #[error("schedule interval must be at least one second")]
    InvalidInterval,

    #[error("ticker universe is empty")]
    EmptyUniverse,
}

/// Configured tickers; `.ETF`-suffixed entries expand to holdings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseConfig {
    #[serde(default)]
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between cycle starts.
    pub interval_secs: u64,
    /// IANA timezone used for DTE and trading hours.
    pub timezone: String,
    /// Skip ticks outside these hours when set.
    pub trading_hours: Option<TradingHours>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            timezone: "America/New_York".to_string(),
            trading_hours: None,
        }
    }
}

/// Upstream endpoint and call budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Overrides the provider's public API URL.
    pub base_url: Option<String>,
    pub calls_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            calls_per_minute: 60,
            timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url.as_deref().unwrap_or(default)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestOptions {
    /// Tickers processed at once within a cycle.
    pub max_concurrent_tickers: usize,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tickers: 1,
        }
    }
}

/// Complete harvester configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub universe: UniverseConfig,
    pub window: DteWindow,
    pub schedule: ScheduleConfig,
    pub tradier: ProviderConfig,
    pub fmp: ProviderConfig,
    pub database: DatabaseConfig,
    pub harvest: HarvestOptions,
}

impl HarvestConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Replace the configured tickers with a comma-separated list.
    pub fn override_tickers(&mut self, csv: &str) {
        self.universe.tickers = csv
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    pub fn entries(&self) -> Vec<UniverseEntry> {
        UniverseEntry::parse_all(self.universe.tickers.iter().map(String::as_str))
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.schedule
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.schedule.timezone.clone()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_secs)
    }

    pub fn tradier_base_url(&self) -> &str {
        self.tradier.base_url_or(tradier::DEFAULT_BASE_URL)
    }

    pub fn fmp_base_url(&self) -> &str {
        self.fmp.base_url_or(fmp::DEFAULT_BASE_URL)
    }

    /// Reject configurations that cannot run. Called before the first tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entries().is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        if !self.window.is_valid() {
            return Err(ConfigError::InvalidWindow {
                min_dte: self.window.min_dte,
                max_dte: self.window.max_dte,
            });
        }
        if self.schedule.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if let Some(hours) = &self.schedule.trading_hours {
            if !hours.is_valid() {
                return Err(ConfigError::InvalidTradingHours {
                    open_hour: hours.open_hour,
                    close_hour: hours.close_hour,
                });
            }
        }
        self.timezone()?;
        Ok(())
    }
}

/// Provider and database secrets.
#[derive(Clone)]
pub struct Credentials {
    pub tradier_api_key: String,
    pub fmp_api_key: String,
    pub database_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env(config: &HarvestConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Resolve credentials through `lookup`; blank values count as missing.
    pub fn from_lookup(
        config: &HarvestConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &'static str| non_blank(lookup(key));

        let tradier_api_key = get(TRADIER_API_KEY).ok_or(ConfigError::MissingCredential(TRADIER_API_KEY))?;
        let fmp_api_key = get(FMP_API_KEY).ok_or(ConfigError::MissingCredential(FMP_API_KEY))?;
        let database_url = Self::database_url(config, &lookup)?;

        Ok(Self {
            tradier_api_key,
            fmp_api_key,
            database_url,
        })
    }

    /// `DATABASE_URL` from the environment, else `[database] url`.
    pub fn database_url_from_env(config: &HarvestConfig) -> Result<String, ConfigError> {
        Self::database_url(config, |key| std::env::var(key).ok())
    }

    /// Database URL only, for commands that never talk to the providers.
    pub fn database_url(
        config: &HarvestConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        non_blank(lookup(DATABASE_URL))
            .or_else(|| non_blank(config.database.url.clone()))
            .ok_or(ConfigError::MissingCredential(DATABASE_URL))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
