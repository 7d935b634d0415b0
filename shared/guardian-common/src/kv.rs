//! Durable key-value storage
//!
//! Backs the legacy unstructured store and the small migration state
//! record. Values are plain strings; callers own their encoding.

use crate::{GuardianError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::debug;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Redis-backed store; keys are namespaced with a fixed prefix
#[derive(Clone)]
pub struct RedisKeyValueStore {
    connection_manager: ConnectionManager,
    namespace: String,
}

impl RedisKeyValueStore {
    pub async fn new(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| GuardianError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let connection_manager = ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            namespace: namespace.into(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        conn.set::<_, _, ()>(self.namespaced(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let deleted: u32 = conn.del(self.namespaced(key)).await?;
        if deleted == 0 {
            debug!("No entry found to remove for key: {}", key);
        }
        Ok(())
    }
}

/// Process-local store for tests and hosts without Redis
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, String>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
