//! Data migration manager
//!
//! State machine over the persisted [`MigrationState`]:
//!
//! - `version >= target` is `NotNeeded`, nothing runs.
//! - `version < target` is `Needed`; `perform_migration` runs every feature
//!   still `Unmigrated`, flips each feature flag only after its data is
//!   written, and advances `version` as the very last write.
//!
//! A failed step returns a failed [`MigrationResult`] without touching the
//! version, so the next call resumes from the first unfinished feature.

use crate::definitions::{
    CleanupResult, MigrationResult, MigrationState, MigrationStatus, CURRENT_MIGRATION_VERSION,
};
use crate::legacy::{parse_legacy_chat_blob, ParsedChatBlob, LEGACY_CHAT_KEY};
use crate::state::MigrationStateStore;
use crate::store::{ChatMessageRecord, StructuredStore};
use crate::{MigrationError, Result};
use chrono::Utc;
use guardian_common::KeyValueStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct DataMigrationManager {
    legacy: Arc<dyn KeyValueStore>,
    state: MigrationStateStore,
    store: Arc<dyn StructuredStore>,
    target_version: u32,
    profile_lock: Mutex<()>,
}

struct ChatOutcome {
    migrated: usize,
    skipped: usize,
}

impl DataMigrationManager {
    pub fn new(
        legacy: Arc<dyn KeyValueStore>,
        state_kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn StructuredStore>,
    ) -> Self {
        Self {
            legacy,
            state: MigrationStateStore::new(state_kv),
            store,
            target_version: CURRENT_MIGRATION_VERSION,
            profile_lock: Mutex::new(()),
        }
    }

    pub fn with_target_version(mut self, target_version: u32) -> Self {
        self.target_version = target_version;
        self
    }

    /// Whether persisted progress is behind the target version
    ///
    /// An unreadable state record counts as needed; the migration run then
    /// reports the underlying error.
    pub async fn is_migration_needed(&self) -> bool {
        match self.state.load().await {
            Ok(state) => state.version < self.target_version,
            Err(e) => {
                warn!("could not read migration state, assuming migration needed: {}", e);
                true
            }
        }
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        let state = self.state.load().await?;
        Ok(MigrationStatus {
            state,
            target_version: self.target_version,
            phase: state.phase(self.target_version),
        })
    }

    pub async fn perform_migration(&self, device_id: &str) -> MigrationResult {
        match self.run_migration(device_id).await {
            Ok(result) => {
                info!(
                    device_id,
                    child_created = result.child_created,
                    messages_migrated = result.messages_migrated,
                    records_skipped = result.records_skipped,
                    "migration completed"
                );
                result
            }
            Err(e) => {
                error!(device_id, "migration failed: {}", e);
                MigrationResult::failed(e.to_string())
            }
        }
    }

    async fn run_migration(&self, device_id: &str) -> Result<MigrationResult> {
        if device_id.trim().is_empty() {
            return Err(MigrationError::MissingIdentity);
        }

        let lookup = {
            let _guard = self.profile_lock.lock().await;
            self.store.get_or_create_child_profile(device_id).await?
        };

        let state = self.state.load().await?;
        let chat = if state.chat_migrated {
            info!("chat history already migrated, skipping");
            ChatOutcome {
                migrated: 0,
                skipped: 0,
            }
        } else {
            self.migrate_chat(lookup.profile.id).await?
        };

        self.state.set_version(self.target_version).await?;

        Ok(MigrationResult::succeeded(
            lookup.created,
            chat.migrated,
            chat.skipped,
        ))
    }

    async fn migrate_chat(&self, profile_id: i64) -> Result<ChatOutcome> {
        let parsed = match self.legacy.get_string(LEGACY_CHAT_KEY).await? {
            Some(raw) => parse_legacy_chat_blob(&raw)?,
            None => ParsedChatBlob::default(),
        };

        let migrated_at = Utc::now();
        let mut seen: HashMap<i64, u32> = HashMap::new();
        let mut records: Vec<ChatMessageRecord> = Vec::with_capacity(parsed.messages.len());
        for message in &parsed.messages {
            let Some(record) = ChatMessageRecord::from_legacy(profile_id, message, migrated_at)
            else {
                continue;
            };
            let occurrence = seen.entry(message.id).or_insert(0);
            if *occurrence > 0 {
                warn!(
                    "legacy chat id {} repeated in blob, storing copy {} separately",
                    message.id, occurrence
                );
            }
            records.push(record.with_occurrence(*occurrence));
            *occurrence += 1;
        }

        let migrated = if records.is_empty() {
            0
        } else {
            self.store.insert_chat_messages(profile_id, &records).await?
        };

        self.state.mark_chat_migrated().await?;

        if parsed.skipped > 0 {
            warn!(
                "{} legacy chat records could not be parsed and were skipped",
                parsed.skipped
            );
        }

        Ok(ChatOutcome {
            migrated,
            skipped: parsed.skipped,
        })
    }

    /// Remove legacy chat data once it has been migrated
    pub async fn cleanup_old_data(&self) -> CleanupResult {
        let state = match self.state.load().await {
            Ok(state) => state,
            Err(e) => {
                error!("cleanup aborted, migration state unreadable: {}", e);
                return CleanupResult::failed(e.to_string());
            }
        };

        if !state.chat_migrated {
            warn!("cleanup skipped: legacy chat data has not been migrated yet");
            return CleanupResult::failed("legacy chat data has not been migrated");
        }

        match self.legacy.remove(LEGACY_CHAT_KEY).await {
            Ok(()) => {
                info!("legacy chat data removed");
                CleanupResult::removed()
            }
            Err(e) => {
                error!("failed to remove legacy chat data: {}", e);
                CleanupResult::failed(e.to_string())
            }
        }
    }

    /// Clear all migration progress so the next run starts from scratch
    pub async fn reset_migration_status(&self) -> Result<()> {
        warn!("resetting migration status; migration will run again from scratch");
        self.state.clear().await
    }

    pub async fn current_state(&self) -> Result<MigrationState> {
        self.state.load().await
    }
}
