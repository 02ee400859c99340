pub mod expirations;
pub mod normalize;
pub mod orchestrator;
pub mod scheduler;
pub mod universe;

pub use expirations::{days_to_expiration, eligible_expirations, DteWindow};
pub use normalize::normalize_chain;
pub use orchestrator::{CycleReport, HarvestError, Harvester, TickerHarvest};
pub use scheduler::{Scheduler, TickOutcome, TradingHours};
pub use universe::{expand_universe, resolve_etf, Expansion, TickerUniverse, UniverseEntry};
