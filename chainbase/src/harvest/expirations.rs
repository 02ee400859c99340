//! Days-to-expiration window filtering.
//!
//! DTE is the calendar-day difference between the expiration date and the
//! date of `now` in the canonical timezone. Time of day does not matter: an
//! expiration tomorrow is 1 DTE at 09:30 and at 15:59 alike.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Inclusive `[min_dte, max_dte]` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DteWindow {
    pub min_dte: i64,
    pub max_dte: i64,
}

impl Default for DteWindow {
    fn default() -> Self {
        Self {
            min_dte: 1,
            max_dte: 90,
        }
    }
}

impl DteWindow {
    pub fn new(min_dte: i64, max_dte: i64) -> Self {
        Self { min_dte, max_dte }
    }

    /// `min_dte >= 0` and `min_dte <= max_dte`.
    pub fn is_valid(&self) -> bool {
        self.min_dte >= 0 && self.min_dte <= self.max_dte
    }

    pub fn contains(&self, dte: i64) -> bool {
        dte >= self.min_dte && dte <= self.max_dte
    }
}

/// Whole calendar days from `now` to `expiration`.
pub fn days_to_expiration(expiration: NaiveDate, now: &DateTime<Tz>) -> i64 {
    (expiration - now.date_naive()).num_days()
}

/// Expirations whose DTE falls inside `window`, in input order.
///
/// Dates that do not parse as `YYYY-MM-DD` are skipped.
pub fn eligible_expirations(
    dates: &[String],
    now: &DateTime<Tz>,
    window: &DteWindow,
) -> Vec<NaiveDate> {
    dates
        .iter()
        .filter_map(|raw| match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(raw = %raw, error = %e, "skipping unparseable expiration");
                None
            }
        })
        .filter(|date| window.contains(days_to_expiration(*date, now)))
        .collect()
}
