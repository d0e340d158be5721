//! Retry backoff for failed page loads

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure; zero disables backoff
    pub initial_backoff: Duration,
    /// Longest a failed page load can hold off the next one
    pub max_backoff: Duration,
    /// Growth of the delay per further failed load
    pub backoff_multiplier: f64,
    /// Spread each delay by up to 30% either way
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    pub fn disabled() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            jitter: false,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.initial_backoff.is_zero()
    }

    /// Delay to wait after `consecutive_failures` failed loads in a row
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if !self.is_enabled() || consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = (consecutive_failures - 1).min(32) as i32;
        let base_ms = (self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(exponent))
        .min(self.max_backoff.as_millis() as f64);

        apply_jitter(Duration::from_millis(base_ms as u64), self.jitter)
    }

    /// Delay for failures a quick retry cannot fix (auth, bad request, decode)
    pub fn ceiling(&self) -> Duration {
        if self.is_enabled() {
            self.max_backoff
        } else {
            Duration::ZERO
        }
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
