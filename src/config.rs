//! Configuration for the governor

use crate::error::{DwaraError, Result};
use crate::retry::RetryPolicy;
use std::env;
use std::time::Duration;

/// Governor configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Limiter refill rate, tokens per second
    pub rate: u64,

    /// Limiter burst capacity
    pub burst: u64,

    /// Re-attempts after the initial call
    pub max_retries: u32,

    /// Delay before the first re-attempt, in milliseconds
    pub initial_delay_ms: u64,

    /// Cap on the backoff delay, in milliseconds
    pub max_delay_ms: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Capacity of the failure log
    pub failure_log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate: 5,
            burst: 10,
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            failure_log_capacity: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(rate) = env::var("DWARA_RATE") {
            config.rate = rate
                .parse()
                .map_err(|e| DwaraError::Config(format!("invalid DWARA_RATE: {e}")))?;
        }

        if let Ok(burst) = env::var("DWARA_BURST") {
            config.burst = burst
                .parse()
                .map_err(|e| DwaraError::Config(format!("invalid DWARA_BURST: {e}")))?;
        }

        if let Ok(retries) = env::var("DWARA_MAX_RETRIES") {
            config.max_retries = retries
                .parse()
                .map_err(|e| DwaraError::Config(format!("invalid DWARA_MAX_RETRIES: {e}")))?;
        }

        if let Ok(delay) = env::var("DWARA_INITIAL_DELAY_MS") {
            config.initial_delay_ms = delay
                .parse()
                .map_err(|e| DwaraError::Config(format!("invalid DWARA_INITIAL_DELAY_MS: {e}")))?;
        }

        if let Ok(delay) = env::var("DWARA_MAX_DELAY_MS") {
            config.max_delay_ms = delay
                .parse()
                .map_err(|e| DwaraError::Config(format!("invalid DWARA_MAX_DELAY_MS: {e}")))?;
        }

        if let Ok(multiplier) = env::var("DWARA_BACKOFF_MULTIPLIER") {
            config.backoff_multiplier = multiplier
                .parse()
                .map_err(|e| DwaraError::Config(format!("invalid DWARA_BACKOFF_MULTIPLIER: {e}")))?;
        }

        if let Ok(capacity) = env::var("DWARA_FAILURE_LOG_CAPACITY") {
            config.failure_log_capacity = capacity.parse().map_err(|e| {
                DwaraError::Config(format!("invalid DWARA_FAILURE_LOG_CAPACITY: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently stall the storefront
    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(DwaraError::Config("rate must be positive".into()));
        }
        if self.burst == 0 {
            return Err(DwaraError::Config("burst must be positive".into()));
        }
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(DwaraError::Config(format!(
                "backoff multiplier must be at least 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(DwaraError::Config(format!(
                "initial delay {}ms exceeds max delay {}ms",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Build the retry policy this configuration describes
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rate, 5);
        assert_eq!(config.burst, 10);
        assert_eq!(config.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        // Uses default values since env vars aren't set
        let config = Config::from_env().unwrap();
        assert!(config.rate > 0);
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let config = Config {
            rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let config = Config {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = Config {
            initial_delay_ms: 60_000,
            max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_mirrors_config() {
        let config = Config {
            max_retries: 7,
            initial_delay_ms: 250,
            max_delay_ms: 4_000,
            backoff_multiplier: 3.0,
            ..Default::default()
        };

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_millis(4_000));
        assert_eq!(policy.backoff_multiplier, 3.0);
        assert!(policy.jitter.is_none());
    }
}
