//! Error types for data migration

use guardian_common::GuardianError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Storage error: {0}")]
    Storage(#[from] GuardianError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Legacy chat data is not a JSON array: {0}")]
    MalformedLegacyBlob(#[source] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt migration state for key {key}: {value}")]
    CorruptState { key: String, value: String },

    #[error("Device identity is empty")]
    MissingIdentity,
}
