use std::time::Duration;

use floorline_core::{BackoffStrategy, SchedulerSettings};

/// Delay before a not-ready request is tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&SchedulerSettings::default())
    }
}

impl BackoffPolicy {
    pub fn constant(initial: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Constant,
            initial,
            max: initial,
        }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            initial,
            max,
        }
    }

    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self {
            strategy: settings.backoff,
            initial: settings.initial_backoff(),
            max: settings.max_backoff(),
        }
    }

    /// Delay for a request that has already been retried `attempts` times.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Constant => self.initial,
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
                self.initial
                    .checked_mul(factor)
                    .unwrap_or(Duration::MAX)
                    .min(self.max.max(self.initial))
            }
        }
    }
}
