pub mod client;
pub mod fmp;
pub mod source;
pub mod throttle;
pub mod tradier;
pub mod types;

pub use client::{ApiClient, Auth, FetchError};
pub use fmp::FmpClient;
pub use source::{HoldingsSource, OptionsSource};
pub use throttle::RateLimiter;
pub use tradier::TradierClient;
pub use types::{HoldingsSnapshot, NormalizedChain, OptionRecord, OptionType};
