//! Background Sync Provider
//!
//! Keeps time-sensitive alerts flowing to the device across process restarts
//! and network loss:
//!
//! - [`AlertSyncJob`] fetches pending critical alerts, shows them as local
//!   notifications keyed by alert id and acknowledges them in one batch.
//! - [`JobScheduler`] runs the job on a cadence behind a connectivity
//!   constraint, re-attempting runs that end in [`JobOutcome::Retry`].
//! - [`EventReporter`] sends locally detected critical events without ever
//!   blocking or failing the caller.
//! - [`BackgroundSyncProvider`] wires everything together and runs the
//!   one-time legacy data migration on start.

pub mod config;
pub mod error;
pub mod event_reporter;
pub mod notifier;
pub mod provider;
pub mod remote;
pub mod scheduler;
pub mod sync_job;

pub use config::SyncSettings;
pub use error::SyncError;
pub use event_reporter::{EventReporter, ReportOutcome, ReporterScope, ReporterStats};
pub use notifier::{NotificationRenderer, NotificationTray, RenderedNotification};
pub use provider::{BackgroundSyncProvider, ProviderComponents, StartupReport};
pub use remote::{AlertEndpoint, HttpAlertEndpoint};
pub use scheduler::{
    AlwaysConnected, ConnectivityProbe, HttpConnectivityProbe, JobOutcome, JobScheduler,
    ScheduleResult, WorkConstraint, Worker,
};
pub use sync_job::{AlertSyncJob, ALERT_SYNC_WORK_NAME};

// Re-export Result type for convenience
pub type Result<T> = std::result::Result<T, SyncError>;
