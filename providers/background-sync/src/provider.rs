use crate::config::SyncSettings;
use crate::event_reporter::{EventReporter, ReporterScope};
use crate::notifier::NotificationTray;
use crate::remote::{AlertEndpoint, HttpAlertEndpoint};
use crate::scheduler::{
    AlwaysConnected, ConnectivityProbe, HttpConnectivityProbe, JobOutcome, JobScheduler,
    ScheduleResult,
};
use crate::sync_job::{AlertSyncJob, ALERT_SYNC_WORK_NAME};
use crate::{Result, SyncError};
use data_migration::{
    DataMigrationManager, MigrationResult, RedisStructuredStore, StructuredStore,
};
use guardian_common::{
    GuardianConfig, IdentityResolver, KeyValueStore, RedisKeyValueStore, StaticIdentity,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything the provider depends on, injectable for tests
pub struct ProviderComponents {
    pub identity: Arc<StaticIdentity>,
    pub endpoint: Arc<dyn AlertEndpoint>,
    pub tray: Arc<NotificationTray>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    /// Store holding the legacy chat blob
    pub legacy_kv: Arc<dyn KeyValueStore>,
    /// Store holding migration progress
    pub state_kv: Arc<dyn KeyValueStore>,
    pub structured_store: Arc<dyn StructuredStore>,
}

/// What happened during [`BackgroundSyncProvider::start`]
#[derive(Debug, Clone)]
pub struct StartupReport {
    /// `None` when no migration was needed or no identity was available
    pub migration: Option<MigrationResult>,
    pub schedule: ScheduleResult,
}

/// Background Sync Provider
pub struct BackgroundSyncProvider {
    settings: SyncSettings,
    identity: Arc<StaticIdentity>,
    tray: Arc<NotificationTray>,
    scheduler: Arc<JobScheduler>,
    sync_job: Arc<AlertSyncJob>,
    reporter: Arc<EventReporter>,
    migration: Arc<DataMigrationManager>,
    immediate_sync: RwLock<Option<JoinHandle<JobOutcome>>>,
}

impl BackgroundSyncProvider {
    pub async fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let config = if !props.is_empty() {
            GuardianConfig::from_properties(props)
                .map_err(|e| SyncError::Configuration(format!("Config error: {}", e)))?
        } else {
            GuardianConfig::from_env().unwrap_or_default()
        };

        Self::new(config).await
    }

    /// Build the provider against Redis and the monitoring server
    pub async fn new(config: GuardianConfig) -> Result<Self> {
        info!("Initializing Background Sync Provider");

        let settings = SyncSettings::from_config(&config);
        let kv: Arc<dyn KeyValueStore> = Arc::new(
            RedisKeyValueStore::new(&config.redis_url, config.kv_namespace.clone()).await?,
        );
        let structured_store = Arc::new(
            RedisStructuredStore::new(&config.redis_url, config.kv_namespace.clone()).await?,
        );
        let connectivity: Arc<dyn ConnectivityProbe> = match &config.connectivity_check_url {
            Some(url) => Arc::new(HttpConnectivityProbe::new(url.clone(), settings.request_timeout)?),
            None => Arc::new(AlwaysConnected),
        };

        let components = ProviderComponents {
            identity: Arc::new(StaticIdentity::from_config(&config)),
            endpoint: Arc::new(HttpAlertEndpoint::new(settings.request_timeout)?),
            tray: Arc::new(NotificationTray::new()),
            connectivity,
            legacy_kv: kv.clone(),
            state_kv: kv,
            structured_store,
        };

        Self::assemble(settings, components)
    }

    /// Wire components together; must be called inside a tokio runtime
    pub fn assemble(settings: SyncSettings, components: ProviderComponents) -> Result<Self> {
        let identity_resolver: Arc<dyn IdentityResolver> = components.identity.clone();

        let scheduler = Arc::new(JobScheduler::new(
            components.connectivity,
            settings.retry.clone(),
            settings.constraint_poll,
        ));
        let sync_job = Arc::new(AlertSyncJob::new(
            identity_resolver.clone(),
            components.endpoint.clone(),
            components.tray.clone(),
        ));
        let reporter = Arc::new(EventReporter::new(
            identity_resolver,
            components.endpoint,
            ReporterScope::start()?,
        ));
        let migration = Arc::new(DataMigrationManager::new(
            components.legacy_kv,
            components.state_kv,
            components.structured_store,
        ));

        Ok(Self {
            settings,
            identity: components.identity,
            tray: components.tray,
            scheduler,
            sync_job,
            reporter,
            migration,
            immediate_sync: RwLock::new(None),
        })
    }

    /// Migrate legacy data if needed, then start alert delivery
    ///
    /// Cleanup of legacy data is never run here.
    pub async fn start(&self) -> Result<StartupReport> {
        let migration = self.run_startup_migration().await;

        let schedule = self
            .sync_job
            .schedule(&self.scheduler, self.settings.sync_interval);
        info!(
            "Scheduled {} every {:?} ({:?})",
            ALERT_SYNC_WORK_NAME, self.settings.sync_interval, schedule
        );

        let handle = self.sync_job.trigger_immediate(&self.scheduler);
        *self.immediate_sync.write().await = Some(handle);

        Ok(StartupReport {
            migration,
            schedule,
        })
    }

    async fn run_startup_migration(&self) -> Option<MigrationResult> {
        if !self.migration.is_migration_needed().await {
            info!("Legacy data migration not needed");
            return None;
        }

        let Some(device_id) = self.identity.resolve_device_id() else {
            warn!("Legacy data migration pending but device identity is not provisioned");
            return None;
        };

        let result = self.migration.perform_migration(&device_id).await;
        if !result.success {
            warn!(
                "Legacy data migration failed, will retry on next start: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Some(result)
    }

    /// Wait for the start-up sync run, if one was triggered and not yet awaited
    pub async fn wait_for_immediate_sync(&self) -> Option<JobOutcome> {
        let handle = self.immediate_sync.write().await.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Immediate sync task ended abnormally: {}", e);
                None
            }
        }
    }

    pub fn reporter(&self) -> Arc<EventReporter> {
        self.reporter.clone()
    }

    pub fn migration(&self) -> Arc<DataMigrationManager> {
        self.migration.clone()
    }

    pub fn tray(&self) -> Arc<NotificationTray> {
        self.tray.clone()
    }

    pub fn identity(&self) -> Arc<StaticIdentity> {
        self.identity.clone()
    }

    pub fn scheduler(&self) -> Arc<JobScheduler> {
        self.scheduler.clone()
    }

    pub async fn shutdown(&self) {
        info!("Shutting down Background Sync Provider");
        self.scheduler.shutdown();
        if let Some(handle) = self.immediate_sync.write().await.take() {
            handle.abort();
        }
    }
}
