//! Transfer engine configuration
//!
//! Defaults mirror the production values: a pool of 50 workers, at least
//! 10 objects per worker, and a per-batch failure ceiling of 3.

use serde::{Deserialize, Serialize};

/// Default worker pool capacity for bulk operations
pub const DEFAULT_POOL_SIZE: usize = 50;

/// Minimum number of objects assigned to one worker
pub const DEFAULT_MIN_BATCH: usize = 10;

/// Failures tolerated within one batch before it stops
pub const DEFAULT_MAX_BATCH_FAILURES: usize = 3;

/// Tuning knobs for the bulk-transfer coordinators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Upper bound on concurrently active workers
    pub pool_size: usize,
    /// Floor batch size; small inputs never fan out to more workers than
    /// `total / min_batch`
    pub min_batch: usize,
    /// A batch stops attempting further keys once this many individual
    /// failures accumulate within it. This is a batch-level ceiling, not a
    /// per-key retry count: three failures anywhere in the batch end it.
    pub max_batch_failures: usize,
    /// Backoff settings for callers wrapping single backend calls
    pub retry: RetryConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            min_batch: DEFAULT_MIN_BATCH,
            max_batch_failures: DEFAULT_MAX_BATCH_FAILURES,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryBuilder::new().build()
    }
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.pool_size, 50);
        assert_eq!(config.min_batch, 10);
        assert_eq!(config.max_batch_failures, 3);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_retry_builder() {
        let config = RetryBuilder::new()
            .max_attempts(5)
            .initial_backoff_ms(200)
            .max_backoff_ms(20000)
            .build();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 200);
        assert_eq!(config.max_backoff_ms, 20000);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TransferConfig = toml::from_str("pool_size = 8").unwrap();
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.min_batch, 10);
        assert_eq!(config.max_batch_failures, 3);
    }
}
