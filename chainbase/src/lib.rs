pub mod config;
pub mod data;
pub mod harvest;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, Credentials, HarvestConfig};
pub use data::{FetchError, OptionRecord, OptionType, RateLimiter};
pub use harvest::{CycleReport, DteWindow, Harvester, Scheduler, TradingHours, UniverseEntry};
pub use storage::{PgOptionStore, RecordSink, StorageError};
