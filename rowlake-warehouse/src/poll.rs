//! Bounded completion polling.
//!
//! Query jobs finish asynchronously; the executor re-checks their status
//! on a fixed interval. The policy bounds that loop: once the attempts
//! are exhausted the caller gets a timeout error instead of hanging on a
//! stalled job.

use std::time::Duration;

use serde::Deserialize;

/// Default pause between status checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
/// Default attempt bound (two minutes at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 240;

/// Bounded polling policy for query completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollPolicy {
    /// Milliseconds between status checks.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum number of status checks before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    /// Create a policy with the default interval and attempt bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval between status checks.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the maximum number of status checks.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// The pause between status checks.
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
