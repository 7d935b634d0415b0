//! Error types shared by Guardian background services

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("Redis connection error: {0}")]
    RedisConnection(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Unexpected response status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Device identity not provisioned")]
    IdentityMissing,
}

impl GuardianError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GuardianError::RedisConnection(_)
            | GuardianError::Transport(_)
            | GuardianError::Store(_) => true,
            GuardianError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            GuardianError::Configuration(_)
            | GuardianError::Serialization(_)
            | GuardianError::IdentityMissing => false,
        }
    }
}
