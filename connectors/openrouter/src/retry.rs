//! Retry decisions for upstream requests

use crate::config::OpenRouterConfig;
use larder_core::errors::ClassifiedError;
use std::time::Duration;

/// Outcome of classifying a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then issue the next attempt
    Retry { delay: Duration },
    /// Surface the error to the caller
    GiveUp,
}

/// Bounded exponential backoff over transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        let base_delay = base_delay.max(Duration::from_millis(1));
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &OpenRouterConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given 1-based attempt failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Decide what to do after `attempt` (1-based) failed with `error`.
    ///
    /// | failure                                  | decision                 |
    /// |------------------------------------------|--------------------------|
    /// | transient, attempts left                 | retry after backoff      |
    /// | transient, budget exhausted              | give up with this error  |
    /// | not transient (401, 400, 402, local)     | give up immediately      |
    pub fn decide(&self, error: &ClassifiedError, attempt: u32) -> RetryDecision {
        if error.is_transient() && attempt < self.max_attempts {
            RetryDecision::Retry {
                delay: self.delay_for(attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OpenRouterConfig::default())
    }
}
