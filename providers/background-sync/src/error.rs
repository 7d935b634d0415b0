//! Error types for Background Sync Provider

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Guardian(#[from] guardian_common::GuardianError),

    #[error("Migration setup error: {0}")]
    Migration(#[from] data_migration::MigrationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No async runtime available: {0}")]
    Runtime(String),
}
