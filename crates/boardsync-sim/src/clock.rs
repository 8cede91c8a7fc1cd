use std::cell::Cell;

use boardsync_core::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Parameters for assigning per-tab simulated clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Base timestamp in milliseconds.
    pub base_millis: i64,
    /// Wall time advanced per simulation round.
    pub tick_millis: i64,
    /// Maximum absolute skew assigned to a tab. Tabs disagree on time, which
    /// chat ordering must tolerate.
    pub max_abs_skew_millis: i64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            base_millis: 1_767_225_600_000,
            tick_millis: 250,
            max_abs_skew_millis: 1_500,
        }
    }
}

impl ClockConfig {
    /// Clock for one tab, with a skew drawn from `rng`.
    #[must_use]
    pub fn assign(&self, rng: &mut DeterministicRng) -> SimulatedClock {
        let span = u64::try_from(self.max_abs_skew_millis.max(0))
            .unwrap_or(0)
            .saturating_mul(2)
            .saturating_add(1);
        let offset = i64::try_from(rng.next_bounded(span)).unwrap_or(0);
        SimulatedClock::new(*self, offset - self.max_abs_skew_millis.max(0))
    }
}

/// Round-driven wall clock for one tab.
#[derive(Debug)]
pub struct SimulatedClock {
    config: ClockConfig,
    skew_millis: i64,
    round: Cell<u64>,
}

impl SimulatedClock {
    #[must_use]
    pub const fn new(config: ClockConfig, skew_millis: i64) -> Self {
        Self {
            config,
            skew_millis,
            round: Cell::new(0),
        }
    }

    pub fn set_round(&self, round: u64) {
        self.round.set(round);
    }

    #[must_use]
    pub const fn skew_millis(&self) -> i64 {
        self.skew_millis
    }

    #[must_use]
    pub fn now_millis(&self) -> i64 {
        let round = i64::try_from(self.round.get()).unwrap_or(i64::MAX);
        self.config
            .base_millis
            .saturating_add(self.skew_millis)
            .saturating_add(self.config.tick_millis.saturating_mul(round))
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_millis()).unwrap_or(DateTime::UNIX_EPOCH)
    }
}
