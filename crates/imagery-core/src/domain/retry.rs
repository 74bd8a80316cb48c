//! Retry strategy for queue publishing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry with exponential backoff.
///
/// Used by both intake and orphan recovery when dispatching a task id.
/// Constructed once from configuration and injected; never a global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryStrategy {
    /// Total number of attempts, including the first one.
    pub attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub delay_ms: u64,

    /// Backoff multiplier applied to every following retry.
    pub backoff: f64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 3_000,
            backoff: 1.5,
        }
    }
}

impl RetryStrategy {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            attempts,
            delay_ms: delay.as_millis() as u64,
            backoff,
        }
    }

    /// No waiting between attempts; handy for tests.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO, 1.0)
    }

    /// Attempt count, never below one.
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Delay to wait after the `failed`-th failed attempt (1-indexed).
    ///
    /// delay = delay_ms * backoff^(failed - 1)
    ///
    /// With the defaults (3s, 1.5): 3s, 4.5s, 6.75s, 10.125s
    pub fn delay_after(&self, failed: u32) -> Duration {
        let base_secs = Duration::from_millis(self.delay_ms).as_secs_f64();
        let factor = self.backoff.max(1.0).powi(failed.saturating_sub(1) as i32);
        Duration::from_secs_f64(base_secs * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_has_reasonable_values() {
        let strategy = RetryStrategy::default();
        assert_eq!(strategy.max_attempts(), 5);
        assert_eq!(strategy.delay_after(1), Duration::from_secs(3));
    }

    #[test]
    fn exponential_backoff_increases() {
        let strategy = RetryStrategy::new(5, Duration::from_secs(2), 2.0);

        assert_eq!(strategy.delay_after(1), Duration::from_secs(2));
        assert_eq!(strategy.delay_after(2), Duration::from_secs(4));
        assert_eq!(strategy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryStrategy::immediate(0).max_attempts(), 1);
        assert_eq!(RetryStrategy::immediate(3).delay_after(2), Duration::ZERO);
    }
}
