//! Retry policy for block loads

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::module::traits::BlockError;
use crate::utils::retry::RetryConfig;

type RetryPredicate = Arc<dyn Fn(&BlockError) -> bool + Send + Sync>;

/// Backoff schedule plus the classification of retryable errors
#[derive(Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
    retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s initial delay doubling up to 10s, transient errors only
    fn default() -> Self {
        Self::new(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        })
    }
}

impl RetryPolicy {
    /// Policy retrying transient errors on the given schedule
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retryable: Arc::new(BlockError::is_transient),
        }
    }

    /// A single attempt, never retried
    pub fn none() -> Self {
        Self::new(RetryConfig::new(1, Duration::ZERO))
    }

    /// Replace the retryable-error predicate
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&BlockError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn is_retryable(&self, error: &BlockError) -> bool {
        (self.retryable)(error)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
