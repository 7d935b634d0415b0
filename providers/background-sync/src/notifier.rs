//! Local notification rendering
//!
//! A notification is identified by the alert id it was rendered for. Showing
//! a notification whose id is already visible replaces it, so an alert that
//! is fetched again after a failed acknowledgment never appears twice.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use guardian_common::{AlertSeverity, Result};
use tracing::info;

pub const CRITICAL_ALERT_TITLE: &str = "🚨 Critical Alert";
pub const ALERT_TITLE: &str = "⚠️ Alert";

/// Title shown for an alert of the given severity
pub fn title_for(severity: &AlertSeverity) -> &'static str {
    if severity.is_critical() {
        CRITICAL_ALERT_TITLE
    } else {
        ALERT_TITLE
    }
}

pub trait NotificationRenderer: Send + Sync {
    /// Show a notification, replacing any visible one with the same id
    fn show(&self, title: &str, message: &str, notification_id: i64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub shown_at: DateTime<Utc>,
}

/// In-process notification tray keyed by notification id
#[derive(Debug, Default)]
pub struct NotificationTray {
    visible: DashMap<i64, RenderedNotification>,
}

impl NotificationTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible notifications ordered by id
    pub fn visible(&self) -> Vec<RenderedNotification> {
        let mut visible: Vec<_> = self.visible.iter().map(|e| e.value().clone()).collect();
        visible.sort_by_key(|n| n.id);
        visible
    }

    pub fn get(&self, notification_id: i64) -> Option<RenderedNotification> {
        self.visible.get(&notification_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn dismiss(&self, notification_id: i64) -> bool {
        self.visible.remove(&notification_id).is_some()
    }
}

impl NotificationRenderer for NotificationTray {
    fn show(&self, title: &str, message: &str, notification_id: i64) -> Result<()> {
        let replaced = self
            .visible
            .insert(
                notification_id,
                RenderedNotification {
                    id: notification_id,
                    title: title.to_string(),
                    message: message.to_string(),
                    shown_at: Utc::now(),
                },
            )
            .is_some();

        info!(notification_id, replaced, "{}: {}", title, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_depends_on_severity() {
        assert_eq!(title_for(&AlertSeverity::Critical), CRITICAL_ALERT_TITLE);
        assert_eq!(title_for(&AlertSeverity::from("WARNING")), ALERT_TITLE);
        assert_eq!(title_for(&AlertSeverity::from("INFO")), ALERT_TITLE);
    }

    #[test]
    fn test_same_id_replaces_notification() {
        let tray = NotificationTray::new();
        tray.show(CRITICAL_ALERT_TITLE, "Child left safe zone", 7).unwrap();
        tray.show(CRITICAL_ALERT_TITLE, "Child left safe zone (updated)", 7)
            .unwrap();

        assert_eq!(tray.len(), 1);
        assert_eq!(tray.get(7).unwrap().message, "Child left safe zone (updated)");
    }

    #[test]
    fn test_distinct_ids_coexist_and_dismiss() {
        let tray = NotificationTray::new();
        tray.show(ALERT_TITLE, "b", 8).unwrap();
        tray.show(CRITICAL_ALERT_TITLE, "a", 7).unwrap();

        let ids: Vec<i64> = tray.visible().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![7, 8]);

        assert!(tray.dismiss(7));
        assert!(!tray.dismiss(7));
        assert_eq!(tray.len(), 1);
    }
}
