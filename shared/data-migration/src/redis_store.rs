//! Redis-backed structured store
//!
//! Key schema:
//!
//! ```text
//! {ns}:child_profile:next_id            # INCR counter for profile ids
//! {ns}:child_profile:device:{device_id} # ChildProfile JSON, written with SET NX
//! {ns}:chat_messages:{profile_id}       # HASH: legacy_id[#occurrence] -> ChatMessageRecord JSON
//! ```

use crate::store::{ChatMessageRecord, ChildProfile, ProfileLookup, StructuredStore};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use chrono::Utc;
use guardian_common::GuardianError;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::debug;

#[derive(Clone)]
pub struct RedisStructuredStore {
    connection_manager: ConnectionManager,
    namespace: String,
}

impl RedisStructuredStore {
    pub async fn new(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            MigrationError::Storage(GuardianError::Configuration(format!(
                "Invalid Redis URL: {}",
                e
            )))
        })?;
        let connection_manager = ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            namespace: namespace.into(),
        })
    }

    fn profile_key(&self, device_id: &str) -> String {
        format!("{}:child_profile:device:{}", self.namespace, device_id)
    }

    fn profile_counter_key(&self) -> String {
        format!("{}:child_profile:next_id", self.namespace)
    }

    fn messages_key(&self, profile_id: i64) -> String {
        format!("{}:chat_messages:{}", self.namespace, profile_id)
    }

    async fn read_profile(&self, device_id: &str) -> Result<Option<ChildProfile>> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = conn.get(self.profile_key(device_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

/// Hash field for a record; first occurrences keep the bare legacy id
fn message_field(record: &ChatMessageRecord) -> String {
    match record.record_key() {
        (legacy_id, 0) => legacy_id.to_string(),
        (legacy_id, occurrence) => format!("{}#{}", legacy_id, occurrence),
    }
}

#[async_trait]
impl StructuredStore for RedisStructuredStore {
    async fn get_or_create_child_profile(&self, device_id: &str) -> Result<ProfileLookup> {
        if let Some(profile) = self.read_profile(device_id).await? {
            return Ok(ProfileLookup {
                profile,
                created: false,
            });
        }

        let mut conn = self.connection_manager.clone();
        let id: i64 = conn.incr(self.profile_counter_key(), 1).await?;
        let candidate = ChildProfile {
            id,
            device_id: device_id.to_string(),
            created_at: Utc::now(),
        };
        let created: bool = conn
            .set_nx(
                self.profile_key(device_id),
                serde_json::to_string(&candidate)?,
            )
            .await?;

        if created {
            debug!("created child profile {} for device {}", id, device_id);
            return Ok(ProfileLookup {
                profile: candidate,
                created: true,
            });
        }

        // Lost the race to a concurrent creator; theirs is authoritative.
        let profile = self.read_profile(device_id).await?.ok_or_else(|| {
            MigrationError::Storage(GuardianError::Store(format!(
                "child profile for {} vanished after SET NX conflict",
                device_id
            )))
        })?;
        Ok(ProfileLookup {
            profile,
            created: false,
        })
    }

    async fn insert_chat_messages(
        &self,
        profile_id: i64,
        records: &[ChatMessageRecord],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let key = self.messages_key(profile_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for record in records {
            pipe.cmd("HSETNX")
                .arg(&key)
                .arg(message_field(record))
                .arg(serde_json::to_string(record)?);
        }

        let mut conn = self.connection_manager.clone();
        let results: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(results.into_iter().filter(|set| *set == 1).count())
    }

    async fn count_chat_messages(&self, profile_id: i64) -> Result<usize> {
        let mut conn = self.connection_manager.clone();
        let len: usize = conn.hlen(self.messages_key(profile_id)).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Integration tests require Redis running
    // Run with: cargo test -p data-migration -- --ignored

    async fn connect() -> RedisStructuredStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let namespace = format!(
            "guardian-test-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        RedisStructuredStore::new(&url, namespace)
            .await
            .expect("Failed to connect to Redis")
    }

    async fn purge(store: &RedisStructuredStore) {
        let mut conn = store.connection_manager.clone();
        let keys: Vec<String> = conn
            .keys(format!("{}:*", store.namespace))
            .await
            .expect("Failed to list keys");
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.expect("Failed to delete keys");
        }
    }

    fn record(profile_id: i64, legacy_id: i64, occurrence: u32) -> ChatMessageRecord {
        ChatMessageRecord {
            profile_id,
            legacy_id,
            occurrence,
            text: format!("message {}/{}", legacy_id, occurrence),
            is_from_child: true,
            sent_at: Utc::now(),
            migrated_at: Utc::now(),
        }
    }

    #[test]
    fn test_message_field_names() {
        assert_eq!(message_field(&record(1, 42, 0)), "42");
        assert_eq!(message_field(&record(1, 42, 2)), "42#2");
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_profile_creation_yields_one_profile() {
        let store = Arc::new(connect().await);

        let lookups = lookup_concurrently(&store, "dev-1", 8).await;
        let created = lookups.iter().filter(|l| l.created).count();
        assert_eq!(created, 1);
        assert!(lookups.iter().all(|l| l.profile == lookups[0].profile));

        let again = store.get_or_create_child_profile("dev-1").await.unwrap();
        assert!(!again.created);
        assert_eq!(again.profile, lookups[0].profile);

        purge(&store).await;
    }

    async fn lookup_concurrently(
        store: &Arc<RedisStructuredStore>,
        device_id: &str,
        n: usize,
    ) -> Vec<ProfileLookup> {
        let tasks: Vec<_> = (0..n)
            .map(|_| {
                let store = store.clone();
                let device_id = device_id.to_string();
                tokio::spawn(async move { store.get_or_create_child_profile(&device_id).await })
            })
            .collect();

        let mut lookups = Vec::with_capacity(n);
        for task in tasks {
            lookups.push(task.await.unwrap().unwrap());
        }
        lookups
    }

    #[tokio::test]
    #[ignore]
    async fn test_pipeline_counts_only_new_messages() {
        let store = connect().await;
        let profile = store.get_or_create_child_profile("dev-1").await.unwrap().profile;

        let first = vec![record(profile.id, 1, 0), record(profile.id, 1, 1)];
        assert_eq!(
            store.insert_chat_messages(profile.id, &first).await.unwrap(),
            2
        );

        let second = vec![
            record(profile.id, 1, 0),
            record(profile.id, 1, 1),
            record(profile.id, 2, 0),
        ];
        assert_eq!(
            store.insert_chat_messages(profile.id, &second).await.unwrap(),
            1
        );
        assert_eq!(store.count_chat_messages(profile.id).await.unwrap(), 3);
        assert_eq!(store.insert_chat_messages(profile.id, &[]).await.unwrap(), 0);

        purge(&store).await;
    }
}
