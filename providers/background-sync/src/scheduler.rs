//! Durable job scheduler
//!
//! Runs named periodic work and one-off work on the tokio runtime.
//!
//! - At most one periodic schedule exists per name. Scheduling an existing
//!   name updates its interval and constraint in place; a run already in
//!   progress keeps going and is not duplicated.
//! - A periodic tick whose constraint is unmet is skipped. A one-off run
//!   waits until its constraint is met.
//! - A run ending in [`JobOutcome::Retry`] is re-attempted with exponential
//!   backoff until the retry budget is spent. A panicking run counts as a
//!   retry.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use futures::FutureExt;
use guardian_common::config::{MIN_CONSTRAINT_POLL_MS, MIN_SYNC_INTERVAL_MINUTES};
use guardian_common::RetryConfig;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Shortest interval between periodic runs
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(MIN_SYNC_INTERVAL_MINUTES * 60);

/// Shortest delay between connectivity re-checks
pub const MIN_CONSTRAINT_POLL: Duration = Duration::from_millis(MIN_CONSTRAINT_POLL_MS);

/// Terminal outcome of one unit of background work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkConstraint {
    None,
    NetworkConnected,
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> JobOutcome;
}

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// Probe for hosts where connectivity is managed elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConnected;

#[async_trait]
impl ConnectivityProbe for AlwaysConnected {
    async fn is_connected(&self) -> bool {
        true
    }
}

/// Considers the network up when a HEAD request to `url` gets any response
pub struct HttpConnectivityProbe {
    client: Client,
    url: String,
}

impl HttpConnectivityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_connected(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("connectivity probe to {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Whether `schedule_periodic` created a schedule or updated one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleResult {
    Enqueued,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodicParams {
    interval: Duration,
    constraint: WorkConstraint,
}

struct PeriodicEntry {
    params: watch::Sender<PeriodicParams>,
    handle: JoinHandle<()>,
}

struct RunContext {
    connectivity: Arc<dyn ConnectivityProbe>,
    retry: RetryConfig,
    constraint_poll: Duration,
}

impl RunContext {
    async fn constraint_met(&self, constraint: WorkConstraint) -> bool {
        match constraint {
            WorkConstraint::None => true,
            WorkConstraint::NetworkConnected => self.connectivity.is_connected().await,
        }
    }

    async fn wait_for_constraint(&self, constraint: WorkConstraint) {
        while !self.constraint_met(constraint).await {
            tokio::time::sleep(self.constraint_poll).await;
        }
    }

    /// Run once; a panic is contained and reported as a retry
    async fn run_isolated(worker: Arc<dyn Worker>) -> JobOutcome {
        match AssertUnwindSafe(worker.run()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("worker {} panicked", worker.name());
                JobOutcome::Retry
            }
        }
    }

    async fn run_with_retry(
        &self,
        worker: Arc<dyn Worker>,
        constraint: WorkConstraint,
    ) -> JobOutcome {
        let mut backoff = self.retry.to_exponential_backoff();
        let mut attempt = 1;

        loop {
            debug!(
                "running {} (attempt {} of {})",
                worker.name(),
                attempt,
                self.retry.max_attempts
            );

            if Self::run_isolated(worker.clone()).await == JobOutcome::Success {
                return JobOutcome::Success;
            }

            if attempt >= self.retry.max_attempts {
                warn!(
                    "{} requested retry after {} attempts, giving up until next trigger",
                    worker.name(),
                    attempt
                );
                return JobOutcome::Retry;
            }

            let Some(delay) = backoff.next_backoff() else {
                warn!(
                    "backoff exhausted for {} after {} attempts",
                    worker.name(),
                    attempt
                );
                return JobOutcome::Retry;
            };

            warn!(
                "{} requested retry (attempt {}/{}), retrying in {:?}",
                worker.name(),
                attempt,
                self.retry.max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            self.wait_for_constraint(constraint).await;
            attempt += 1;
        }
    }
}

pub struct JobScheduler {
    ctx: Arc<RunContext>,
    periodic: Mutex<HashMap<String, PeriodicEntry>>,
}

impl JobScheduler {
    pub fn new(
        connectivity: Arc<dyn ConnectivityProbe>,
        retry: RetryConfig,
        constraint_poll: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(RunContext {
                connectivity,
                retry,
                constraint_poll: constraint_poll.max(MIN_CONSTRAINT_POLL),
            }),
            periodic: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule `worker` every `interval`, first run one interval from now
    ///
    /// Intervals below [`MIN_PERIODIC_INTERVAL`] are raised to it. Must be
    /// called from within a tokio runtime.
    pub fn schedule_periodic(
        &self,
        name: &str,
        interval: Duration,
        constraint: WorkConstraint,
        worker: Arc<dyn Worker>,
    ) -> ScheduleResult {
        if interval < MIN_PERIODIC_INTERVAL {
            warn!(
                "interval {:?} for {} is below the minimum, using {:?}",
                interval, name, MIN_PERIODIC_INTERVAL
            );
        }
        let interval = interval.max(MIN_PERIODIC_INTERVAL);
        let params = PeriodicParams {
            interval,
            constraint,
        };

        let mut periodic = self.periodic.lock();
        if let Some(entry) = periodic.get(name) {
            if !entry.handle.is_finished() {
                entry.params.send_replace(params);
                info!(
                    "updated periodic work {}: every {:?}, {:?}",
                    name, interval, constraint
                );
                return ScheduleResult::Updated;
            }
        }

        let (tx, rx) = watch::channel(params);
        let handle = tokio::spawn(periodic_loop(
            self.ctx.clone(),
            name.to_string(),
            worker,
            rx,
        ));
        periodic.insert(
            name.to_string(),
            PeriodicEntry {
                params: tx,
                handle,
            },
        );
        info!(
            "enqueued periodic work {}: every {:?}, {:?}",
            name, interval, constraint
        );
        ScheduleResult::Enqueued
    }

    /// Run `worker` once as soon as `constraint` is met
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger_immediate(
        &self,
        constraint: WorkConstraint,
        worker: Arc<dyn Worker>,
    ) -> JoinHandle<JobOutcome> {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            ctx.wait_for_constraint(constraint).await;
            let outcome = ctx.run_with_retry(worker.clone(), constraint).await;
            debug!("one-off {} finished with {:?}", worker.name(), outcome);
            outcome
        })
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.periodic
            .lock()
            .get(name)
            .map(|entry| !entry.handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop future runs of `name`
    pub fn cancel(&self, name: &str) -> bool {
        match self.periodic.lock().remove(name) {
            Some(entry) => {
                entry.handle.abort();
                info!("cancelled periodic work {}", name);
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        for (name, entry) in self.periodic.lock().drain() {
            entry.handle.abort();
            debug!("stopped periodic work {}", name);
        }
    }
}

async fn periodic_loop(
    ctx: Arc<RunContext>,
    name: String,
    worker: Arc<dyn Worker>,
    mut params_rx: watch::Receiver<PeriodicParams>,
) {
    let mut params = *params_rx.borrow_and_update();
    let mut cycle_start = Instant::now();

    loop {
        // Wait out the interval, picking up parameter updates as they arrive.
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(cycle_start + params.interval) => break,
                changed = params_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    params = *params_rx.borrow_and_update();
                }
            }
        }
        cycle_start = Instant::now();

        if !ctx.constraint_met(params.constraint).await {
            debug!("skipping {} run: {:?} not met", name, params.constraint);
            continue;
        }

        // The run is its own task; cancelling the schedule does not abort it.
        let run_ctx = ctx.clone();
        let run_worker = worker.clone();
        let constraint = params.constraint;
        let run =
            tokio::spawn(async move { run_ctx.run_with_retry(run_worker, constraint).await });
        match run.await {
            Ok(outcome) => debug!("periodic {} finished with {:?}", name, outcome),
            Err(e) => error!("periodic {} run task failed: {}", name, e),
        }
    }
}
