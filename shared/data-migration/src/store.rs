//! Structured store seam
//!
//! The anchor profile is unique per device id. Chat records are keyed by
//! their legacy id plus its occurrence within the legacy blob, so
//! re-inserting a record is a no-op while repeated legacy ids still get
//! distinct rows.

use crate::legacy::LegacyChatMessage;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Structured record for a monitored child, keyed by device id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildProfile {
    pub id: i64,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLookup {
    pub profile: ChildProfile,
    pub created: bool,
}

/// Chat message as stored in the structured store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub profile_id: i64,
    pub legacy_id: i64,
    /// Position among blob records sharing `legacy_id`, 0 for the first
    #[serde(default)]
    pub occurrence: u32,
    pub text: String,
    pub is_from_child: bool,
    pub sent_at: DateTime<Utc>,
    pub migrated_at: DateTime<Utc>,
}

impl ChatMessageRecord {
    /// Tag a legacy message with its anchor profile
    pub fn from_legacy(
        profile_id: i64,
        message: &LegacyChatMessage,
        migrated_at: DateTime<Utc>,
    ) -> Option<Self> {
        Some(Self {
            profile_id,
            legacy_id: message.id,
            occurrence: 0,
            text: message.text.clone(),
            is_from_child: message.is_from_child,
            sent_at: message.sent_at()?,
            migrated_at,
        })
    }

    pub fn with_occurrence(mut self, occurrence: u32) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Identity of the record within its profile
    pub fn record_key(&self) -> (i64, u32) {
        (self.legacy_id, self.occurrence)
    }
}

#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Return the profile for `device_id`, creating it when absent
    async fn get_or_create_child_profile(&self, device_id: &str) -> Result<ProfileLookup>;

    /// Insert records in one batch; returns how many were new
    async fn insert_chat_messages(
        &self,
        profile_id: i64,
        records: &[ChatMessageRecord],
    ) -> Result<usize>;

    async fn count_chat_messages(&self, profile_id: i64) -> Result<usize>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    next_profile_id: i64,
    profiles: HashMap<String, ChildProfile>,
    messages: HashMap<i64, BTreeMap<(i64, u32), ChatMessageRecord>>,
}

/// Process-local structured store
#[derive(Debug, Default)]
pub struct InMemoryStructuredStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryStructuredStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile_count(&self) -> usize {
        self.state.lock().profiles.len()
    }

    pub fn messages_for(&self, profile_id: i64) -> Vec<ChatMessageRecord> {
        self.state
            .lock()
            .messages
            .get(&profile_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StructuredStore for InMemoryStructuredStore {
    async fn get_or_create_child_profile(&self, device_id: &str) -> Result<ProfileLookup> {
        let mut state = self.state.lock();
        if let Some(profile) = state.profiles.get(device_id) {
            return Ok(ProfileLookup {
                profile: profile.clone(),
                created: false,
            });
        }

        state.next_profile_id += 1;
        let profile = ChildProfile {
            id: state.next_profile_id,
            device_id: device_id.to_string(),
            created_at: Utc::now(),
        };
        state
            .profiles
            .insert(device_id.to_string(), profile.clone());

        Ok(ProfileLookup {
            profile,
            created: true,
        })
    }

    async fn insert_chat_messages(
        &self,
        profile_id: i64,
        records: &[ChatMessageRecord],
    ) -> Result<usize> {
        let mut state = self.state.lock();
        let table = state.messages.entry(profile_id).or_default();

        let mut inserted = 0;
        for record in records {
            if !table.contains_key(&record.record_key()) {
                table.insert(record.record_key(), record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn count_chat_messages(&self, profile_id: i64) -> Result<usize> {
        Ok(self
            .state
            .lock()
            .messages
            .get(&profile_id)
            .map(|m| m.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(profile_id: i64, legacy_id: i64) -> ChatMessageRecord {
        ChatMessageRecord {
            profile_id,
            legacy_id,
            occurrence: 0,
            text: format!("message {}", legacy_id),
            is_from_child: false,
            sent_at: Utc::now(),
            migrated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_profile_is_unique_per_device() {
        let store = InMemoryStructuredStore::new();

        let first = store.get_or_create_child_profile("dev-1").await.unwrap();
        let second = store.get_or_create_child_profile("dev-1").await.unwrap();
        let other = store.get_or_create_child_profile("dev-2").await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.profile, second.profile);
        assert_ne!(first.profile.id, other.profile.id);
        assert_eq!(store.profile_count(), 2);
    }

    #[tokio::test]
    async fn test_reinserting_records_is_a_noop() {
        let store = InMemoryStructuredStore::new();
        let batch = vec![record(1, 10), record(1, 11)];

        assert_eq!(store.insert_chat_messages(1, &batch).await.unwrap(), 2);
        assert_eq!(store.insert_chat_messages(1, &batch).await.unwrap(), 0);
        assert_eq!(store.count_chat_messages(1).await.unwrap(), 2);
        assert_eq!(store.count_chat_messages(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repeated_legacy_id_is_kept_per_occurrence() {
        let store = InMemoryStructuredStore::new();
        let batch = vec![record(1, 10), record(1, 10).with_occurrence(1)];

        assert_eq!(store.insert_chat_messages(1, &batch).await.unwrap(), 2);
        assert_eq!(store.insert_chat_messages(1, &batch).await.unwrap(), 0);
        assert_eq!(store.count_chat_messages(1).await.unwrap(), 2);
    }
}
