//! Pipeline tuning knobs.

use imgagent_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a [`PipelineController`](crate::PipelineController).
///
/// # Examples
///
/// ```
/// use imgagent_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .workers(2usize)
///     .lease_ttl_ms(10_000u64)
///     .lease_renew_interval_ms(3_000u64)
///     .build()
///     .unwrap();
/// assert!(config.validate().is_ok());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_builder::Builder,
)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker loops per controller
    workers: usize,
    /// Candidates fetched per poll
    batch_size: usize,
    /// Sleep after an empty poll, in milliseconds
    poll_interval_ms: u64,
    /// Ceiling of the idle sleep as empty polls repeat, in milliseconds
    max_idle_backoff_ms: u64,
    /// Lease time-to-live in milliseconds
    lease_ttl_ms: u64,
    /// Delay between lease renewals in milliseconds
    lease_renew_interval_ms: u64,
    /// Deadline of one stage execution in milliseconds
    stage_timeout_ms: u64,
    /// How long shutdown waits for workers before aborting them, in milliseconds
    shutdown_grace_ms: u64,
    /// Consecutive failures after which a document is marked failed
    max_attempts: u32,
    /// Retry delay after the first failure, in milliseconds
    retry_base_ms: u64,
    /// Longest retry delay, in milliseconds
    retry_max_ms: u64,
    /// Mark a document failed on the first permanent error
    fail_fast_on_permanent: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 8,
            poll_interval_ms: 1_000,
            max_idle_backoff_ms: 30_000,
            lease_ttl_ms: 60_000,
            lease_renew_interval_ms: 20_000,
            stage_timeout_ms: 600_000,
            shutdown_grace_ms: 30_000,
            max_attempts: 5,
            retry_base_ms: 2_000,
            retry_max_ms: 300_000,
            fail_fast_on_permanent: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a new config builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Same settings with a different worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Check the settings for combinations the controller cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::new("pipeline.workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("pipeline.batch_size must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::new("pipeline.poll_interval_ms must be positive"));
        }
        if self.max_idle_backoff_ms < self.poll_interval_ms {
            return Err(ConfigError::new(
                "pipeline.max_idle_backoff_ms must not be below poll_interval_ms",
            ));
        }
        if self.lease_renew_interval_ms == 0
            || self.lease_renew_interval_ms.saturating_mul(2) >= self.lease_ttl_ms
        {
            return Err(ConfigError::new(format!(
                "pipeline.lease_renew_interval_ms ({}) must be positive and less than half of lease_ttl_ms ({})",
                self.lease_renew_interval_ms, self.lease_ttl_ms
            )));
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::new("pipeline.stage_timeout_ms must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::new("pipeline.max_attempts must be at least 1"));
        }
        if self.retry_base_ms > self.retry_max_ms {
            return Err(ConfigError::new(format!(
                "pipeline.retry_base_ms ({}) must not exceed retry_max_ms ({})",
                self.retry_base_ms, self.retry_max_ms
            )));
        }
        Ok(())
    }

    /// Lease time-to-live.
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    /// Delay between lease renewals.
    pub fn lease_renew_interval(&self) -> Duration {
        Duration::from_millis(self.lease_renew_interval_ms)
    }

    /// Deadline of one stage execution.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_slow_renewal() {
        let config = PipelineConfig::builder()
            .lease_ttl_ms(10_000u64)
            .lease_renew_interval_ms(5_000u64)
            .build()
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lease_renew_interval_ms"));
    }

    #[test]
    fn test_rejects_huge_renewal_without_overflow() {
        let config = PipelineConfig::builder()
            .lease_ttl_ms(u64::MAX)
            .lease_renew_interval_ms(u64::MAX)
            .build()
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lease_renew_interval_ms"));
    }

    #[test]
    fn test_rejects_zero_workers_and_attempts() {
        let config = PipelineConfig::builder().workers(0usize).build().unwrap();
        assert!(config.validate().is_err());

        let config = PipelineConfig::builder().max_attempts(0u32).build().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_base_above_cap() {
        let config = PipelineConfig::builder()
            .retry_base_ms(10_000u64)
            .retry_max_ms(1_000u64)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
