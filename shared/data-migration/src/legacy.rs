//! Legacy chat history blob
//!
//! Older installs kept chat history as one JSON array under a single key in
//! the unstructured store. Individual records may be damaged; those are
//! skipped so the rest of the history still migrates.

use crate::{MigrationError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Key of the legacy chat history blob in the unstructured store
pub const LEGACY_CHAT_KEY: &str = "chat_messages";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyChatMessage {
    pub id: i64,
    #[serde(alias = "message")]
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default)]
    pub is_from_child: bool,
}

impl LegacyChatMessage {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedChatBlob {
    pub messages: Vec<LegacyChatMessage>,
    pub skipped: usize,
}

/// Parse the legacy blob, skipping malformed elements
///
/// An empty or whitespace-only blob is zero messages. A blob that is not a
/// JSON array at all is an error.
pub fn parse_legacy_chat_blob(raw: &str) -> Result<ParsedChatBlob> {
    if raw.trim().is_empty() {
        return Ok(ParsedChatBlob::default());
    }

    let elements: Vec<Value> =
        serde_json::from_str(raw).map_err(MigrationError::MalformedLegacyBlob)?;

    let mut parsed = ParsedChatBlob::default();
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<LegacyChatMessage>(element) {
            Ok(message) if message.sent_at().is_some() => parsed.messages.push(message),
            Ok(message) => {
                warn!(
                    "skipping legacy chat record {} (id {}): timestamp {} out of range",
                    index, message.id, message.timestamp
                );
                parsed.skipped += 1;
            }
            Err(e) => {
                warn!("skipping malformed legacy chat record {}: {}", index, e);
                parsed.skipped += 1;
            }
        }
    }

    Ok(parsed)
}
