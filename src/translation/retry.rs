/*!
 * Back-off policy for retrying a translation unit.
 */

use crate::app_config::RetryConfig;
use crate::errors::ProviderError;
use rand::Rng;
use std::time::Duration;

/// Exponential back-off with jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Fraction of the delay added at random, 0 disables jitter
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_base: config.exponential_base,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy without waiting, for tests and dry runs
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
            jitter: 0.0,
        }
    }

    /// Total attempts allowed for one unit
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }

    /// Deterministic delay before retry number `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.exponential_base.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Delay before retry number `attempt`; a server-provided retry-after wins, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after.min(self.max_delay);
        }

        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::rng().random_range(0.0..self.jitter);
        base.mul_f64(1.0 + extra).min(self.max_delay)
    }
}
