//! Block replay backoff settings

use std::time::Duration;

use serde::Deserialize;

/// Delay policy for replaying a block after a restart that asked for backoff
///
/// Delay for attempt `n` (0-based) is `initial_backoff * multiplier^n`,
/// capped at `max_backoff`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Default: 100ms
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Default: 8s
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Default: 2
    pub multiplier: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(8),
            multiplier: 2,
        }
    }
}
