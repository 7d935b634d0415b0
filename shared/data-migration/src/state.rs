//! Durable migration state record
//!
//! Stored as two small key-value entries next to the legacy data, outside
//! the structured store.

use crate::definitions::MigrationState;
use crate::{MigrationError, Result};
use guardian_common::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

pub const MIGRATION_VERSION_KEY: &str = "migration_version";
pub const CHAT_MIGRATED_KEY: &str = "chat_migrated";

pub struct MigrationStateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl MigrationStateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Read the persisted state; missing entries read as the initial state
    pub async fn load(&self) -> Result<MigrationState> {
        let version = match self.kv.get_string(MIGRATION_VERSION_KEY).await? {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| MigrationError::CorruptState {
                    key: MIGRATION_VERSION_KEY.to_string(),
                    value: raw.clone(),
                })?,
            None => 0,
        };

        let chat_migrated = match self.kv.get_string(CHAT_MIGRATED_KEY).await? {
            Some(raw) => match raw.trim() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(MigrationError::CorruptState {
                        key: CHAT_MIGRATED_KEY.to_string(),
                        value: raw,
                    })
                }
            },
            None => false,
        };

        Ok(MigrationState {
            version,
            chat_migrated,
        })
    }

    pub async fn mark_chat_migrated(&self) -> Result<()> {
        self.kv.set_string(CHAT_MIGRATED_KEY, "true").await?;
        debug!("chat migration flag set");
        Ok(())
    }

    pub async fn set_version(&self, version: u32) -> Result<()> {
        self.kv
            .set_string(MIGRATION_VERSION_KEY, &version.to_string())
            .await?;
        debug!("migration version set to {}", version);
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.kv.remove(MIGRATION_VERSION_KEY).await?;
        self.kv.remove(CHAT_MIGRATED_KEY).await?;
        Ok(())
    }
}
