//! Core types for critical alert delivery and event reporting
//!
//! Alerts are produced by the remote endpoint and live for one sync cycle.
//! Events are produced locally and live for one report call. Neither is
//! persisted on the device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity attached to a critical alert by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertSeverity {
    Critical,
    /// Any non-critical severity, kept verbatim (e.g. `WARNING`)
    Other(String),
}

impl AlertSeverity {
    pub fn as_str(&self) -> &str {
        match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, AlertSeverity::Critical)
    }
}

impl From<String> for AlertSeverity {
    fn from(raw: String) -> Self {
        if raw == "CRITICAL" {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Other(raw)
        }
    }
}

impl From<&str> for AlertSeverity {
    fn from(raw: &str) -> Self {
        AlertSeverity::from(raw.to_string())
    }
}

impl Serialize for AlertSeverity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlertSeverity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(AlertSeverity::from)
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pending alert fetched from the server for this device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriticalAlert {
    pub id: i64,
    pub severity: AlertSeverity,
    pub message: String,
}

/// A locally detected event sent to the server on a best-effort basis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticalEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub severity: String,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl CriticalEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: impl Into<String>,
        message: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            severity: severity.into(),
            message: message.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}
