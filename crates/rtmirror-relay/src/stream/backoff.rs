//! Reconnect backoff policy.

use std::time::Duration;

/// Geometric backoff between reconnect attempts.
///
/// Attempt `i` (0-indexed) waits `base * (1 + growth)^i`, rounded to whole
/// milliseconds. After `max_attempts` consecutive failures the stream is
/// given up on.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub growth: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            growth: 0.10,
            max_attempts: 30,
        }
    }
}

impl BackoffPolicy {
    /// Delay after failed attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = (1.0 + self.growth).powi(attempt as i32);
        let millis = (self.base.as_millis() as f64 * factor).round();
        Duration::from_millis(millis as u64)
    }

    /// Total sleep across the first `attempts` failures.
    pub fn total_delay(&self, attempts: u32) -> Duration {
        (0..attempts).map(|i| self.delay(i)).sum()
    }
}
