//! Exponential-backoff policy used by the worker's idle loop and by
//! the provider client's retries of idempotent calls.
//!
//! The growth function is deterministic and clamped; jitter is applied
//! separately so tests can pin the deterministic part.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each retry.
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`: each delay is scaled by a random
    /// factor in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Stateful backoff sequence.
///
/// `delay()` returns the current (jittered) delay and advances the
/// sequence; `reset()` returns to the initial delay after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self { config, current }
    }

    /// The next delay to sleep, with jitter applied. Advances the
    /// deterministic sequence.
    pub fn delay(&mut self) -> Duration {
        let base = self.current;
        self.current = next_delay(self.current, &self.config);
        apply_jitter(base, self.config.jitter)
    }

    /// Return to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }

    /// The current deterministic delay, without jitter or advancement.
    pub fn current(&self) -> Duration {
        self.current
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let factor = 1.0 + rand::rng().random_range(-jitter..=jitter);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = BackoffConfig::default();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(8), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = BackoffConfig::default();
        let mut delay = config.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = apply_jitter(base, 0.1);
            assert!(jittered >= Duration::from_millis(900), "{jittered:?}");
            assert!(jittered <= Duration::from_millis(1100), "{jittered:?}");
        }
    }

    #[test]
    fn current_peeks_without_advancing() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        });
        assert_eq!(backoff.current(), Duration::from_secs(1));
        assert_eq!(backoff.current(), Duration::from_secs(1));
        backoff.delay();
        assert_eq!(backoff.current(), Duration::from_secs(2));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        });
        assert_eq!(backoff.delay(), Duration::from_secs(1));
        assert_eq!(backoff.delay(), Duration::from_secs(2));
        backoff.reset();
        assert_eq!(backoff.delay(), Duration::from_secs(1));
    }
}
