//! Delay between cycles.

use crate::config::UpdaterConfig;
use crate::core::RetryKind;
use crate::updater::outcome::UpdateOutcome;
use std::time::Duration;

/// Timer settings of the update loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    initial_delay: Duration,
    interval: Duration,
    retry_interval: Duration,
}

impl SchedulePolicy {
    /// Explicit timings.
    #[must_use]
    pub const fn new(initial_delay: Duration, interval: Duration, retry_interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
            retry_interval,
        }
    }

    /// Timings from the `[updater]` section.
    #[must_use]
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.initial_delay(), config.check_interval(), config.retry_interval())
    }

    /// Delay before the first cycle.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Delay after a cycle that ended with `outcome`.
    #[must_use]
    pub fn next_delay(&self, outcome: &UpdateOutcome) -> Duration {
        match outcome.error().map(|error| error.retry_kind()) {
            Some(RetryKind::Fast) => self.retry_interval,
            Some(RetryKind::Normal) | None => self.interval,
        }
    }
}
