//! Shared types and utilities for Guardian background services
//!
//! This library provides the identity, alert and event types, the durable
//! key-value store seam and the configuration used by the background sync
//! provider and the data migration manager.

pub mod config;
pub mod error;
pub mod identity;
pub mod kv;
pub mod retry;
pub mod types;

pub use config::GuardianConfig;
pub use error::GuardianError;
pub use identity::{IdentityResolver, StaticIdentity};
pub use kv::{InMemoryKeyValueStore, KeyValueStore, RedisKeyValueStore};
pub use retry::RetryConfig;
pub use types::*;

// Re-export Result type for convenience
pub type Result<T> = std::result::Result<T, GuardianError>;
