//! Migration state and result definitions

use serde::{Deserialize, Serialize};

/// Schema version a fully migrated install is at
pub const CURRENT_MIGRATION_VERSION: u32 = 1;

/// Persisted migration progress
///
/// `chat_migrated` only ever moves from `false` to `true`; the sole way back
/// is an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub version: u32,
    pub chat_migrated: bool,
}

impl MigrationState {
    pub fn phase(&self, target_version: u32) -> MigrationPhase {
        if self.version >= target_version {
            MigrationPhase::NotNeeded
        } else {
            MigrationPhase::Needed
        }
    }

    pub fn chat_status(&self) -> FeatureStatus {
        if self.chat_migrated {
            FeatureStatus::Migrated
        } else {
            FeatureStatus::Unmigrated
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationPhase {
    NotNeeded,
    Needed,
}

/// Completion marker for a single migrated feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureStatus {
    Unmigrated,
    Migrated,
}

/// Outcome of one `perform_migration` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    pub child_created: bool,
    pub messages_migrated: usize,
    pub records_skipped: usize,
    pub error: Option<String>,
}

impl MigrationResult {
    pub fn succeeded(child_created: bool, messages_migrated: usize, records_skipped: usize) -> Self {
        Self {
            success: true,
            child_created,
            messages_migrated,
            records_skipped,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of one `cleanup_old_data` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub success: bool,
    pub legacy_data_removed: bool,
    pub error: Option<String>,
}

impl CleanupResult {
    pub fn removed() -> Self {
        Self {
            success: true,
            legacy_data_removed: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            legacy_data_removed: false,
            error: Some(error.into()),
        }
    }
}

/// Snapshot of persisted progress against the target version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub state: MigrationState,
    pub target_version: u32,
    pub phase: MigrationPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_needs_migration() {
        let state = MigrationState::default();
        assert_eq!(state.phase(CURRENT_MIGRATION_VERSION), MigrationPhase::Needed);
        assert_eq!(state.chat_status(), FeatureStatus::Unmigrated);
    }

    #[test]
    fn test_state_at_target_is_not_needed() {
        let state = MigrationState {
            version: CURRENT_MIGRATION_VERSION,
            chat_migrated: true,
        };
        assert_eq!(state.phase(CURRENT_MIGRATION_VERSION), MigrationPhase::NotNeeded);
        assert_eq!(state.phase(CURRENT_MIGRATION_VERSION + 1), MigrationPhase::Needed);
    }

    #[test]
    fn test_failed_result_carries_error() {
        let result = MigrationResult::failed("insert failed");
        assert!(!result.success);
        assert!(!result.child_created);
        assert_eq!(result.messages_migrated, 0);
        assert_eq!(result.error.as_deref(), Some("insert failed"));
    }
}
