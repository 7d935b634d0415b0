//! Retry policy for background work
//!
//! A job that ends in a retry outcome is re-attempted on an exponential
//! backoff schedule until `max_attempts` runs have been made.

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 30_000, // 30 seconds
            max_delay_ms: 300_000,    // 5 minutes
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            exponential_base: 2.0,
            jitter: true,
        }
    }

    /// Run once, never re-attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            exponential_base: 1.0,
            jitter: false,
        }
    }

    /// Fixed delays without jitter, mostly useful in tests
    pub fn deterministic(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn to_exponential_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_delay_ms),
            current_interval: Duration::from_millis(self.initial_delay_ms),
            max_interval: Duration::from_millis(self.max_delay_ms),
            multiplier: self.exponential_base,
            max_elapsed_time: None,
            ..Default::default()
        };

        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }

        backoff
    }
}
