//! Reconnect Policy
//!
//! Fixed-delay, unbounded retry for transport faults. The bounded regime for
//! protocol faults lives in the connection lifecycle; both wait the same
//! delay before the next attempt.

use std::time::Duration;

use rand::Rng;

/// Reconnect timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Delay before every new attempt.
    pub delay: Duration,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(5000),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Fixed delay without jitter.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            jitter_factor: 0.0,
        }
    }
}

/// Counts transport retries and hands out delays.
///
/// ```rust
/// use std::time::Duration;
/// use trade_feed::infrastructure::stomp::retry::{RetryConfig, RetryPolicy};
///
/// let mut policy = RetryPolicy::new(RetryConfig::fixed(Duration::from_millis(250)));
/// assert_eq!(policy.next_delay(), Duration::from_millis(250));
/// assert_eq!(policy.next_delay(), Duration::from_millis(250));
/// assert_eq!(policy.attempt_count(), 2);
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt_count: u32,
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Never runs out.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.apply_jitter(self.config.delay)
    }

    /// Forget past attempts after a successful handshake.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Transport retries since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_five_seconds_without_jitter() {
        let config = RetryConfig::default();
        assert_eq!(config.delay, Duration::from_secs(5));
        assert!(config.jitter_factor.abs() < f64::EPSILON);
    }

    #[test]
    fn delay_is_fixed_and_unbounded() {
        let mut policy = RetryPolicy::new(RetryConfig::fixed(Duration::from_millis(100)));
        for _ in 0..1000 {
            assert_eq!(policy.next_delay(), Duration::from_millis(100));
        }
        assert_eq!(policy.attempt_count(), 1000);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let mut policy = RetryPolicy::new(RetryConfig {
                delay: Duration::from_millis(1000),
                jitter_factor: 0.1,
            });
            let millis = policy.next_delay().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of range");
        }
    }

    #[test]
    fn zero_delay_stays_zero() {
        let mut policy = RetryPolicy::new(RetryConfig {
            delay: Duration::ZERO,
            jitter_factor: 0.5,
        });
        assert_eq!(policy.next_delay(), Duration::ZERO);
    }
}
