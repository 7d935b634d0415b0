//! Best-effort critical event reporting
//!
//! `report` returns immediately. Each event is sent by its own task inside a
//! process-wide [`ReporterScope`]; a failed or panicking send is logged and
//! dropped without affecting the caller or any other send. Outcomes flow over
//! a channel to a logging task that only keeps counters.

use crate::remote::AlertEndpoint;
use crate::{Result, SyncError};
use futures::FutureExt;
use guardian_common::{CriticalEvent, IdentityResolver};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Delivered,
    Rejected,
    Failed(String),
}

#[derive(Debug)]
struct OutcomeRecord {
    report_id: Uuid,
    event_type: String,
    outcome: ReportOutcome,
}

/// Counters kept by the outcome logger
#[derive(Debug, Default)]
pub struct ReporterStats {
    delivered: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl ReporterStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.delivered() + self.rejected() + self.failed()
    }
}

/// Supervising scope for report tasks
///
/// Created once at start-up and alive until the process exits. Tasks are
/// detached: none of them can cancel the scope or a sibling.
pub struct ReporterScope {
    runtime: Handle,
    outcomes: mpsc::UnboundedSender<OutcomeRecord>,
    stats: Arc<ReporterStats>,
}

impl ReporterScope {
    /// Create the scope on the current tokio runtime
    pub fn start() -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Runtime(e.to_string()))?;
        Ok(Self::on_runtime(runtime))
    }

    pub fn on_runtime(runtime: Handle) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutcomeRecord>();
        let stats = Arc::new(ReporterStats::default());

        let logger_stats = stats.clone();
        runtime.spawn(async move {
            while let Some(record) = rx.recv().await {
                match &record.outcome {
                    ReportOutcome::Delivered => {
                        logger_stats.delivered.fetch_add(1, Ordering::Relaxed);
                        debug!(report_id = %record.report_id, "critical event {} delivered", record.event_type);
                    }
                    ReportOutcome::Rejected => {
                        logger_stats.rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(report_id = %record.report_id, "server rejected critical event {}", record.event_type);
                    }
                    ReportOutcome::Failed(reason) => {
                        logger_stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(report_id = %record.report_id, "critical event {} dropped: {}", record.event_type, reason);
                    }
                }
            }
        });

        Arc::new(Self {
            runtime,
            outcomes: tx,
            stats,
        })
    }

    pub fn stats(&self) -> Arc<ReporterStats> {
        self.stats.clone()
    }

    fn spawn_send(
        &self,
        endpoint: Arc<dyn AlertEndpoint>,
        server_url: String,
        device_id: String,
        event: CriticalEvent,
    ) -> JoinHandle<()> {
        let outcomes = self.outcomes.clone();
        self.runtime.spawn(async move {
            let send = endpoint.send_critical_event(&server_url, &device_id, &event);
            let outcome = match AssertUnwindSafe(send).catch_unwind().await {
                Ok(Ok(true)) => ReportOutcome::Delivered,
                Ok(Ok(false)) => ReportOutcome::Rejected,
                Ok(Err(e)) => ReportOutcome::Failed(e.to_string()),
                Err(_) => ReportOutcome::Failed("send task panicked".to_string()),
            };

            // The logger only goes away with the scope; nothing to do then.
            let _ = outcomes.send(OutcomeRecord {
                report_id: Uuid::new_v4(),
                event_type: event.event_type,
                outcome,
            });
        })
    }
}

pub struct EventReporter {
    identity: Arc<dyn IdentityResolver>,
    endpoint: Arc<dyn AlertEndpoint>,
    scope: Arc<ReporterScope>,
}

impl EventReporter {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        endpoint: Arc<dyn AlertEndpoint>,
        scope: Arc<ReporterScope>,
    ) -> Self {
        Self {
            identity,
            endpoint,
            scope,
        }
    }

    /// Send an event in the background
    ///
    /// Never blocks and never fails. Returns the send task's handle, or
    /// `None` when the device has no identity yet and nothing was sent.
    /// Dropping the handle does not cancel the send.
    pub fn report(
        &self,
        event_type: &str,
        severity: &str,
        message: &str,
        metadata: HashMap<String, Value>,
    ) -> Option<JoinHandle<()>> {
        let Some(device_id) = self.identity.resolve_device_id() else {
            info!("device identity not provisioned, dropping critical event {}", event_type);
            return None;
        };

        let event = CriticalEvent::new(event_type, severity, message, metadata);
        Some(self.scope.spawn_send(
            self.endpoint.clone(),
            self.identity.server_url(),
            device_id,
            event,
        ))
    }

    pub fn stats(&self) -> Arc<ReporterStats> {
        self.scope.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use guardian_common::{CriticalAlert, GuardianError, StaticIdentity};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Behaviour keyed by event type
    #[derive(Default)]
    struct FakeEndpoint {
        sent: Mutex<Vec<(String, CriticalEvent)>>,
    }

    #[async_trait]
    impl AlertEndpoint for FakeEndpoint {
        async fn fetch_critical_alerts(
            &self,
            _server_url: &str,
            _device_id: &str,
        ) -> guardian_common::Result<Vec<CriticalAlert>> {
            unreachable!("reporter never fetches alerts")
        }

        async fn acknowledge_critical_alerts(
            &self,
            _server_url: &str,
            _device_id: &str,
            _alert_ids: &[i64],
        ) -> guardian_common::Result<bool> {
            unreachable!("reporter never acknowledges alerts")
        }

        async fn send_critical_event(
            &self,
            _server_url: &str,
            device_id: &str,
            event: &CriticalEvent,
        ) -> guardian_common::Result<bool> {
            match event.event_type.as_str() {
                "SLOW" => tokio::time::sleep(Duration::from_millis(50)).await,
                "FAIL" => return Err(GuardianError::Transport("connection reset".to_string())),
                "REJECT" => return Ok(false),
                "PANIC" => panic!("endpoint bug"),
                _ => {}
            }
            self.sent
                .lock()
                .push((device_id.to_string(), event.clone()));
            Ok(true)
        }
    }

    fn reporter(device_id: Option<&str>) -> (EventReporter, Arc<FakeEndpoint>) {
        let endpoint = Arc::new(FakeEndpoint::default());
        let identity = Arc::new(StaticIdentity::new(
            "https://api.example.com",
            device_id.map(str::to_string),
            None,
        ));
        let scope = ReporterScope::start().unwrap();
        (EventReporter::new(identity, endpoint.clone(), scope), endpoint)
    }

    async fn wait_for_outcomes(stats: &ReporterStats, expected: u64) {
        for _ in 0..100 {
            if stats.total() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} outcomes, saw {}", expected, stats.total());
    }

    #[tokio::test]
    async fn test_report_sends_event_in_background() {
        let (reporter, endpoint) = reporter(Some("dev-1"));
        let mut metadata = HashMap::new();
        metadata.insert("lat".to_string(), json!(52.1));

        let handle = reporter
            .report("GEOFENCE_EXIT", "CRITICAL", "Left school zone", metadata)
            .expect("identity is provisioned");
        handle.await.unwrap();

        let sent = endpoint.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "dev-1");
        assert_eq!(sent[0].1.event_type, "GEOFENCE_EXIT");
        assert_eq!(sent[0].1.metadata["lat"], json!(52.1));

        wait_for_outcomes(&reporter.stats(), 1).await;
        assert_eq!(reporter.stats().delivered(), 1);
    }

    #[tokio::test]
    async fn test_missing_identity_spawns_nothing() {
        let (reporter, endpoint) = reporter(None);

        assert!(reporter
            .report("SOS", "CRITICAL", "pressed", HashMap::new())
            .is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(endpoint.sent.lock().is_empty());
        assert_eq!(reporter.stats().total(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_from_siblings() {
        let (reporter, endpoint) = reporter(Some("dev-1"));

        let handles: Vec<_> = ["SLOW", "FAIL", "PANIC", "REJECT", "OK"]
            .iter()
            .filter_map(|kind| reporter.report(kind, "WARNING", "test", HashMap::new()))
            .collect();
        assert_eq!(handles.len(), 5);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut delivered: Vec<String> = endpoint
            .sent
            .lock()
            .iter()
            .map(|(_, e)| e.event_type.clone())
            .collect();
        delivered.sort();
        assert_eq!(delivered, vec!["OK".to_string(), "SLOW".to_string()]);

        let stats = reporter.stats();
        wait_for_outcomes(&stats, 5).await;
        assert_eq!(stats.delivered(), 2);
        assert_eq!(stats.rejected(), 1);
        assert_eq!(stats.failed(), 2);
    }

    #[test]
    fn test_scope_requires_runtime() {
        assert!(matches!(ReporterScope::start(), Err(SyncError::Runtime(_))));
    }
}
