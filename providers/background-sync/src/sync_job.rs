//! Critical alert sync job
//!
//! One run: resolve identity, fetch pending alerts, show each as a
//! notification keyed by alert id, acknowledge all of them in one call.
//!
//! - No identity yet: success, nothing to retry until provisioning.
//! - Fetch or render failure: retry, the whole run is re-attempted.
//! - Acknowledgment failure: logged only. The alerts were shown; the next
//!   cycle re-fetches anything still pending and replaces its notification.

use crate::notifier::{title_for, NotificationRenderer};
use crate::remote::AlertEndpoint;
use crate::scheduler::{JobOutcome, JobScheduler, ScheduleResult, WorkConstraint, Worker};
use async_trait::async_trait;
use guardian_common::{GuardianError, IdentityResolver};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Unique name of the periodic alert sync schedule
pub const ALERT_SYNC_WORK_NAME: &str = "critical_alert_sync";

pub struct AlertSyncJob {
    identity: Arc<dyn IdentityResolver>,
    endpoint: Arc<dyn AlertEndpoint>,
    renderer: Arc<dyn NotificationRenderer>,
}

impl AlertSyncJob {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        endpoint: Arc<dyn AlertEndpoint>,
        renderer: Arc<dyn NotificationRenderer>,
    ) -> Self {
        Self {
            identity,
            endpoint,
            renderer,
        }
    }

    /// Register the periodic sync, updating any existing schedule
    pub fn schedule(
        self: &Arc<Self>,
        scheduler: &JobScheduler,
        interval: Duration,
    ) -> ScheduleResult {
        scheduler.schedule_periodic(
            ALERT_SYNC_WORK_NAME,
            interval,
            WorkConstraint::NetworkConnected,
            self.clone(),
        )
    }

    /// Run one sync as soon as the network is available
    pub fn trigger_immediate(
        self: &Arc<Self>,
        scheduler: &JobScheduler,
    ) -> JoinHandle<JobOutcome> {
        scheduler.trigger_immediate(WorkConstraint::NetworkConnected, self.clone())
    }

    async fn sync(&self, device_id: &str) -> Result<usize, GuardianError> {
        let server_url = self.identity.server_url();
        let alerts = self
            .endpoint
            .fetch_critical_alerts(&server_url, device_id)
            .await?;

        if alerts.is_empty() {
            debug!("no pending critical alerts for {}", device_id);
            return Ok(0);
        }

        for alert in &alerts {
            self.renderer
                .show(title_for(&alert.severity), &alert.message, alert.id)?;
        }

        let alert_ids: Vec<i64> = alerts.iter().map(|a| a.id).collect();
        match self
            .endpoint
            .acknowledge_critical_alerts(&server_url, device_id, &alert_ids)
            .await
        {
            Ok(true) => info!(?alert_ids, "acknowledged {} critical alerts", alert_ids.len()),
            Ok(false) => warn!(?alert_ids, "server rejected critical alert acknowledgment"),
            Err(e) => warn!(?alert_ids, "critical alert acknowledgment failed: {}", e),
        }

        Ok(alerts.len())
    }
}

#[async_trait]
impl Worker for AlertSyncJob {
    fn name(&self) -> &str {
        ALERT_SYNC_WORK_NAME
    }

    async fn run(&self) -> JobOutcome {
        let Some(device_id) = self.identity.resolve_device_id() else {
            info!("device identity not provisioned, skipping critical alert sync");
            return JobOutcome::Success;
        };

        match self.sync(&device_id).await {
            Ok(_) => JobOutcome::Success,
            Err(e) => {
                warn!(device_id = %device_id, "critical alert sync failed, will retry: {}", e);
                JobOutcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{NotificationTray, ALERT_TITLE, CRITICAL_ALERT_TITLE};
    use guardian_common::{AlertSeverity, CriticalAlert, CriticalEvent, Result, StaticIdentity};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    type FetchResult = Result<Vec<CriticalAlert>>;

    #[derive(Default)]
    struct FakeEndpoint {
        fetches: Mutex<VecDeque<FetchResult>>,
        fetch_calls: Mutex<Vec<String>>,
        ack_calls: Mutex<Vec<(String, Vec<i64>)>>,
        ack_result: Mutex<Option<Result<bool>>>,
    }

    impl FakeEndpoint {
        fn returning(fetches: Vec<FetchResult>) -> Arc<Self> {
            Arc::new(Self {
                fetches: Mutex::new(fetches.into()),
                ..Default::default()
            })
        }

        fn acking_with(self: Arc<Self>, result: Result<bool>) -> Arc<Self> {
            *self.ack_result.lock() = Some(result);
            self
        }
    }

    #[async_trait]
    impl AlertEndpoint for FakeEndpoint {
        async fn fetch_critical_alerts(&self, _server_url: &str, device_id: &str) -> FetchResult {
            self.fetch_calls.lock().push(device_id.to_string());
            self.fetches.lock().pop_front().unwrap_or_else(|| Ok(vec![]))
        }

        async fn acknowledge_critical_alerts(
            &self,
            _server_url: &str,
            device_id: &str,
            alert_ids: &[i64],
        ) -> Result<bool> {
            self.ack_calls
                .lock()
                .push((device_id.to_string(), alert_ids.to_vec()));
            self.ack_result.lock().take().unwrap_or(Ok(true))
        }

        async fn send_critical_event(
            &self,
            _server_url: &str,
            _device_id: &str,
            _event: &CriticalEvent,
        ) -> Result<bool> {
            unreachable!("sync job never reports events")
        }
    }

    struct BrokenRenderer;

    impl NotificationRenderer for BrokenRenderer {
        fn show(&self, _title: &str, _message: &str, _notification_id: i64) -> Result<()> {
            Err(GuardianError::Configuration("notification channel missing".to_string()))
        }
    }

    fn alert(id: i64, severity: &str) -> CriticalAlert {
        CriticalAlert {
            id,
            severity: AlertSeverity::from(severity),
            message: format!("alert {}", id),
        }
    }

    fn identity(device_id: Option<&str>) -> Arc<StaticIdentity> {
        Arc::new(StaticIdentity::new(
            "https://api.example.com",
            device_id.map(str::to_string),
            None,
        ))
    }

    #[tokio::test]
    async fn test_two_alerts_rendered_and_acknowledged_once() {
        let endpoint =
            FakeEndpoint::returning(vec![Ok(vec![alert(7, "CRITICAL"), alert(8, "WARNING")])]);
        let tray = Arc::new(NotificationTray::new());
        let job = AlertSyncJob::new(identity(Some("dev-1")), endpoint.clone(), tray.clone());

        assert_eq!(job.run().await, JobOutcome::Success);

        let visible = tray.visible();
        assert_eq!(visible.len(), 2);
        assert_eq!((visible[0].id, visible[0].title.as_str()), (7, CRITICAL_ALERT_TITLE));
        assert_eq!((visible[1].id, visible[1].title.as_str()), (8, ALERT_TITLE));

        let acks = endpoint.ack_calls.lock().clone();
        assert_eq!(acks, vec![("dev-1".to_string(), vec![7, 8])]);
    }

    #[tokio::test]
    async fn test_empty_fetch_skips_acknowledgment() {
        let endpoint = FakeEndpoint::returning(vec![Ok(vec![])]);
        let tray = Arc::new(NotificationTray::new());
        let job = AlertSyncJob::new(identity(Some("dev-1")), endpoint.clone(), tray.clone());

        assert_eq!(job.run().await, JobOutcome::Success);
        assert!(tray.is_empty());
        assert!(endpoint.ack_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_identity_makes_no_calls() {
        let endpoint = FakeEndpoint::returning(vec![Ok(vec![alert(1, "CRITICAL")])]);
        let tray = Arc::new(NotificationTray::new());
        let job = AlertSyncJob::new(identity(None), endpoint.clone(), tray.clone());

        assert_eq!(job.run().await, JobOutcome::Success);
        assert!(endpoint.fetch_calls.lock().is_empty());
        assert!(endpoint.ack_calls.lock().is_empty());
        assert!(tray.is_empty());
    }

    #[tokio::test]
    async fn test_child_device_id_scopes_calls() {
        let endpoint = FakeEndpoint::returning(vec![Ok(vec![alert(3, "CRITICAL")])]);
        let identity = identity(Some("dev-1"));
        identity.set_child_device_id(Some("child-1".to_string()));
        let job = AlertSyncJob::new(identity, endpoint.clone(), Arc::new(NotificationTray::new()));

        job.run().await;
        assert_eq!(*endpoint.fetch_calls.lock(), vec!["child-1".to_string()]);
        assert_eq!(endpoint.ack_calls.lock()[0].0, "child-1");
    }

    #[tokio::test]
    async fn test_fetch_failure_requests_retry() {
        let endpoint = FakeEndpoint::returning(vec![Err(GuardianError::Transport(
            "connection refused".to_string(),
        ))]);
        let job = AlertSyncJob::new(
            identity(Some("dev-1")),
            endpoint.clone(),
            Arc::new(NotificationTray::new()),
        );

        assert_eq!(job.run().await, JobOutcome::Retry);
        assert!(endpoint.ack_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_requests_retry() {
        let endpoint = FakeEndpoint::returning(vec![Ok(vec![alert(1, "CRITICAL")])]);
        let job = AlertSyncJob::new(
            identity(Some("dev-1")),
            endpoint.clone(),
            Arc::new(BrokenRenderer),
        );

        assert_eq!(job.run().await, JobOutcome::Retry);
        assert!(endpoint.ack_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledgment_failure_still_succeeds() {
        for ack in [Ok(false), Err(GuardianError::Transport("timeout".to_string()))] {
            let endpoint =
                FakeEndpoint::returning(vec![Ok(vec![alert(5, "CRITICAL")])]).acking_with(ack);
            let tray = Arc::new(NotificationTray::new());
            let job = AlertSyncJob::new(identity(Some("dev-1")), endpoint.clone(), tray.clone());

            assert_eq!(job.run().await, JobOutcome::Success);
            assert_eq!(tray.len(), 1);
            assert_eq!(endpoint.ack_calls.lock().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_refetched_alert_replaces_notification() {
        let endpoint = FakeEndpoint::returning(vec![
            Ok(vec![alert(7, "CRITICAL")]),
            Ok(vec![alert(7, "CRITICAL"), alert(9, "WARNING")]),
        ])
        .acking_with(Ok(false));
        let tray = Arc::new(NotificationTray::new());
        let job = AlertSyncJob::new(identity(Some("dev-1")), endpoint.clone(), tray.clone());

        job.run().await;
        job.run().await;

        let ids: Vec<i64> = tray.visible().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![7, 9]);
        assert_eq!(endpoint.ack_calls.lock()[1].1, vec![7, 9]);
    }
}
