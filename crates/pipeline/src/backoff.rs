//! Exponential backoff

use std::time::Duration;

/// Exponential delay schedule
///
/// Delay for attempt `n` (0-based) is `initial * multiplier^n`, capped at
/// `max`. Used for block replays and for reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(8),
            multiplier: 2,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            initial,
            max,
            multiplier,
        }
    }

    /// Get delay for attempt N
    pub fn delay(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
