//! Configuration for Guardian background services

use crate::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shortest periodic sync interval the scheduler accepts
pub const MIN_SYNC_INTERVAL_MINUTES: u64 = 15;

/// Shortest delay between connectivity re-checks of a waiting run
pub const MIN_CONSTRAINT_POLL_MS: u64 = 100;

/// Configuration shared by the background sync provider and migration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardianConfig {
    /// Base URL of the monitoring server
    pub server_url: String,

    /// Primary device id, absent until the device is provisioned
    #[serde(default)]
    pub device_id: Option<String>,

    /// Child device id, overrides `device_id` when present
    #[serde(default)]
    pub child_device_id: Option<String>,

    /// Redis connection URL (legacy store, migration state, structured store)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key prefix for values in the durable key-value store
    #[serde(default = "default_kv_namespace")]
    pub kv_namespace: String,

    /// Periodic alert sync cadence in minutes
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,

    /// HTTP request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// URL probed to decide whether the network constraint is met
    #[serde(default)]
    pub connectivity_check_url: Option<String>,

    /// Poll interval while an immediate run waits for its constraint
    #[serde(default = "default_constraint_poll_ms")]
    pub constraint_poll_ms: u64,

    /// Number of runs per scheduled trigger before giving up until next period
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl GuardianConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Load configuration from a properties map
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, String> {
        let server_url = props
            .get("server_url")
            .cloned()
            .ok_or_else(|| "server_url is required".to_string())?;

        let non_blank = |key: &str| {
            props
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
        };

        let redis_url = props
            .get("redis_url")
            .cloned()
            .unwrap_or_else(default_redis_url);

        let kv_namespace = props
            .get("kv_namespace")
            .cloned()
            .unwrap_or_else(default_kv_namespace);

        let sync_interval_minutes = props
            .get("sync_interval_minutes")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_sync_interval_minutes);

        let request_timeout_ms = props
            .get("request_timeout_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_request_timeout_ms);

        let constraint_poll_ms = props
            .get("constraint_poll_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_constraint_poll_ms);

        let retry_max_attempts = props
            .get("retry_max_attempts")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_retry_max_attempts);

        let retry_initial_delay_ms = props
            .get("retry_initial_delay_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_retry_initial_delay_ms);

        let retry_max_delay_ms = props
            .get("retry_max_delay_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_retry_max_delay_ms);

        Ok(Self {
            server_url,
            device_id: non_blank("device_id"),
            child_device_id: non_blank("child_device_id"),
            redis_url,
            kv_namespace,
            sync_interval_minutes,
            request_timeout_ms,
            connectivity_check_url: non_blank("connectivity_check_url"),
            constraint_poll_ms,
            retry_max_attempts,
            retry_initial_delay_ms,
            retry_max_delay_ms,
        })
    }

    /// Sync interval, never below the scheduler minimum
    pub fn effective_sync_interval_minutes(&self) -> u64 {
        self.sync_interval_minutes.max(MIN_SYNC_INTERVAL_MINUTES)
    }

    /// Connectivity poll delay, never below [`MIN_CONSTRAINT_POLL_MS`]
    pub fn effective_constraint_poll_ms(&self) -> u64 {
        self.constraint_poll_ms.max(MIN_CONSTRAINT_POLL_MS)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_max_attempts,
            self.retry_initial_delay_ms,
            self.retry_max_delay_ms,
        )
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            device_id: None,
            child_device_id: None,
            redis_url: default_redis_url(),
            kv_namespace: default_kv_namespace(),
            sync_interval_minutes: default_sync_interval_minutes(),
            request_timeout_ms: default_request_timeout_ms(),
            connectivity_check_url: None,
            constraint_poll_ms: default_constraint_poll_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_kv_namespace() -> String {
    "guardian".to_string()
}

fn default_sync_interval_minutes() -> u64 {
    MIN_SYNC_INTERVAL_MINUTES
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_constraint_poll_ms() -> u64 {
    5_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    30_000
}

fn default_retry_max_delay_ms() -> u64 {
    300_000
}
