//! Bounded retry with exponential backoff and jitter for remote store calls

use crate::config::RemoteConfig;
use rand::Rng;
use std::time::Duration;

/// Retry budget applied to every remote call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt
    pub timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Backoff ceiling
    pub max_backoff: Duration,

    /// Randomize each backoff by ±25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl From<&RemoteConfig> for RetryPolicy {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_retries: config.max_retries,
            initial_backoff: config.retry_delay,
            max_backoff: config.max_retry_delay,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Backoff to wait after `attempt` failed attempts (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);

        if self.jitter && !base.is_zero() {
            let factor = rand::thread_rng().gen_range(0.75..1.25);
            base.mul_f64(factor)
        } else {
            base
        }
    }
}
