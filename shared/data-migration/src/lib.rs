//! Legacy data migration
//!
//! Moves chat history from the unstructured key-value area into the
//! structured store exactly once. Progress is tracked in a small durable
//! record with a schema version and one completion flag per migrated
//! feature, so an interrupted run resumes where it stopped and a finished
//! feature is never migrated twice.
//!
//! ## Usage
//!
//! ```ignore
//! use data_migration::{DataMigrationManager, InMemoryStructuredStore};
//! use guardian_common::InMemoryKeyValueStore;
//! use std::sync::Arc;
//!
//! async fn startup(device_id: &str) {
//!     let prefs = Arc::new(InMemoryKeyValueStore::new());
//!     let store = Arc::new(InMemoryStructuredStore::new());
//!     let manager = DataMigrationManager::new(prefs.clone(), prefs, store);
//!
//!     if manager.is_migration_needed().await {
//!         let result = manager.perform_migration(device_id).await;
//!         println!("migrated {} messages", result.messages_migrated);
//!     }
//! }
//! ```
//!
//! Legacy data is only removed by an explicit `cleanup_old_data()` call.

pub mod definitions;
pub mod error;
pub mod legacy;
pub mod manager;
pub mod redis_store;
pub mod state;
pub mod store;

pub use definitions::{
    CleanupResult, FeatureStatus, MigrationPhase, MigrationResult, MigrationState,
    MigrationStatus, CURRENT_MIGRATION_VERSION,
};
pub use error::MigrationError;
pub use legacy::{parse_legacy_chat_blob, LegacyChatMessage, ParsedChatBlob, LEGACY_CHAT_KEY};
pub use manager::DataMigrationManager;
pub use redis_store::RedisStructuredStore;
pub use state::MigrationStateStore;
pub use store::{
    ChatMessageRecord, ChildProfile, InMemoryStructuredStore, ProfileLookup, StructuredStore,
};

pub type Result<T> = std::result::Result<T, MigrationError>;
