//! Fixed-interval cycle loop with an optional trading-hours gate.
//!
//! Ticks are spaced `interval` apart from one invocation to the next whether
//! the previous tick ran a cycle or was gated. A cycle always runs to
//! completion before the next tick is awaited, so cycles never overlap.
//! Shutdown is only honored between cycles.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::orchestrator::{CycleReport, HarvestError, Harvester};
use crate::data::{HoldingsSource, OptionsSource};
use crate::storage::RecordSink;

fn default_weekdays_only() -> bool {
    true
}

/// Local hours `[open_hour, close_hour)` in which cycles are allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingHours {
    pub open_hour: u32,
    pub close_hour: u32,
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            open_hour: 9,
            close_hour: 16,
            weekdays_only: true,
        }
    }
}

impl TradingHours {
    pub fn is_valid(&self) -> bool {
        self.open_hour < self.close_hour && self.close_hour <= 24
    }

    /// Check if `now` (already in the canonical timezone) is inside the window.
    pub fn is_open(&self, now: &DateTime<Tz>) -> bool {
        if self.weekdays_only && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let hour = now.hour();
        hour >= self.open_hour && hour < self.close_hour
    }
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Completed(CycleReport),
    Failed(HarvestError),
    Skipped,
}

/// Re-runs harvest cycles on a fixed period.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    timezone: Tz,
    trading_hours: Option<TradingHours>,
    max_cycles: Option<u64>,
}

impl Scheduler {
    pub fn new(interval: Duration, timezone: Tz) -> Self {
        Self {
            interval,
            timezone,
            trading_hours: None,
            max_cycles: None,
        }
    }

    pub fn with_trading_hours(mut self, hours: Option<TradingHours>) -> Self {
        self.trading_hours = hours;
        self
    }

    /// Stop after `n` ticks instead of running forever.
    pub fn with_max_cycles(mut self, n: Option<u64>) -> Self {
        self.max_cycles = n;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current time in the canonical timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// Run one tick at `now`: a full cycle, or nothing if outside trading hours.
    pub async fn tick<O, H, S>(&self, harvester: &Harvester<O, H, S>, now: &DateTime<Tz>) -> TickOutcome
    where
        O: OptionsSource + Sync,
        H: HoldingsSource + Sync,
        S: RecordSink + Sync,
    {
        if let Some(hours) = &self.trading_hours {
            if !hours.is_open(now) {
                info!(
                    now = %now.format("%Y-%m-%d %H:%M %Z"),
                    open = hours.open_hour,
                    close = hours.close_hour,
                    "outside trading hours, skipping cycle"
                );
                return TickOutcome::Skipped;
            }
        }

        match harvester.run_cycle(now).await {
            Ok(report) => TickOutcome::Completed(report),
            Err(e) => {
                error!(error = %e, "harvest cycle failed, writes discarded");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick every `interval` until `max_cycles` is reached (or forever).
    ///
    /// Returns the number of ticks performed.
    pub async fn run<O, H, S>(&self, harvester: &Harvester<O, H, S>) -> u64
    where
        O: OptionsSource + Sync,
        H: HoldingsSource + Sync,
        S: RecordSink + Sync,
    {
        self.run_until(harvester, std::future::pending()).await
    }

    /// Like [`Scheduler::run`], but also stops once `shutdown` resolves.
    ///
    /// `shutdown` is only raced against the wait for the next tick. A cycle
    /// that has started always runs to completion (including its commit);
    /// a signal that arrives meanwhile is seen before the next tick.
    pub async fn run_until<O, H, S, F>(&self, harvester: &Harvester<O, H, S>, shutdown: F) -> u64
    where
        O: OptionsSource + Sync,
        H: HoldingsSource + Sync,
        S: RecordSink + Sync,
        F: Future<Output = ()>,
    {
        info!(
            interval_secs = self.interval.as_secs(),
            timezone = %self.timezone,
            gated = self.trading_hours.is_some(),
            "scheduler started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;
        tokio::pin!(shutdown);

        loop {
            if self.max_cycles.is_some_and(|max| ticks >= max) {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }
            let now = self.now();
            self.tick(harvester, &now).await;
            ticks += 1;
        }

        info!(ticks, "scheduler stopped");
        ticks
    }
}
