//! Runtime settings derived from [`GuardianConfig`]

use guardian_common::{GuardianConfig, RetryConfig};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub constraint_poll: Duration,
    pub retry: RetryConfig,
}

impl SyncSettings {
    pub fn from_config(config: &GuardianConfig) -> Self {
        Self {
            sync_interval: Duration::from_secs(config.effective_sync_interval_minutes() * 60),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            constraint_poll: Duration::from_millis(config.effective_constraint_poll_ms()),
            retry: config.retry_config(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&GuardianConfig::default())
    }
}
