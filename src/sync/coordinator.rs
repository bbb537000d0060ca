//! Sync coordinator: drains the queue against the remote endpoint.
//!
//! At most one drain runs at a time. The drain permit and the online flag
//! share one guard owned by the [`NetworkMonitor`], so "online and idle" is
//! checked and claimed in one step. Remote and storage failures never leave
//! the coordinator; they are recorded on queue items and summarized in the
//! returned [`DrainReport`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::guard::DrainRefusal;
use super::item::{now, SyncQueueItem};
use super::network::NetworkMonitor;
use super::policy::{AlwaysRetry, RetryDecision, RetryPolicy};
use super::queue::SyncQueue;
use super::remote::{RemoteEndpoint, RemoteError};
use crate::config::SyncConfig;
use crate::error::FieldSyncError;
use crate::storage::LocalStore;

/// Tunables for a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Maximum items pulled per `dequeue_batch`.
    pub batch_size: usize,
    /// Deadline for one remote apply.
    pub apply_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            apply_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&SyncConfig> for CoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            apply_timeout: config.apply_timeout(),
        }
    }
}

/// How a drain request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every eligible item was attempted.
    Completed,
    /// Offline when requested; nothing was attempted.
    Offline,
    /// Another drain was already in flight; this request was a no-op.
    AlreadyRunning,
    /// Went offline mid-drain; stopped before the next remote call.
    StoppedOffline,
    /// A local store read or write failed; the drain stopped.
    StorageFailed,
}

impl DrainOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Offline => "offline",
            Self::AlreadyRunning => "already_running",
            Self::StoppedOffline => "stopped_offline",
            Self::StorageFailed => "storage_failed",
        }
    }
}

impl std::fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of one drain request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Items acknowledged and committed locally
    pub applied: usize,
    /// Items whose remote apply failed or timed out
    pub failed: usize,
    /// Items the retry policy said to wait on
    pub skipped: usize,
    /// Items acknowledged while a newer edit was merged in; left queued
    pub superseded: usize,
    /// Items moved to the dead-letter view
    pub abandoned: usize,
    /// Storage error that stopped the drain
    pub storage_error: Option<String>,
}

impl DrainReport {
    const fn new(outcome: DrainOutcome) -> Self {
        Self {
            outcome,
            applied: 0,
            failed: 0,
            skipped: 0,
            superseded: 0,
            abandoned: 0,
            storage_error: None,
        }
    }

    /// Remote calls made during this drain.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.applied + self.failed + self.superseded
    }

    /// Whether this request actually ran a drain.
    #[must_use]
    pub const fn ran(&self) -> bool {
        !matches!(self.outcome, DrainOutcome::Offline | DrainOutcome::AlreadyRunning)
    }

    fn storage_failed(mut self, e: &FieldSyncError) -> Self {
        error!(error = %e, "storage failure during drain");
        self.outcome = DrainOutcome::StorageFailed;
        self.storage_error = Some(e.to_string());
        self
    }
}

/// Drives queued items to the remote endpoint.
///
/// Cloning shares the coordinator; concurrent `drain_now` calls on any
/// clone collapse into the running drain.
#[derive(Clone)]
pub struct SyncCoordinator {
    store: LocalStore,
    queue: SyncQueue,
    remote: Arc<dyn RemoteEndpoint>,
    monitor: NetworkMonitor,
    policy: Arc<dyn RetryPolicy>,
    config: CoordinatorConfig,
}

impl SyncCoordinator {
    /// Create a coordinator with the default config and [`AlwaysRetry`].
    #[must_use]
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteEndpoint>, monitor: NetworkMonitor) -> Self {
        Self {
            queue: store.queue(),
            store,
            remote,
            monitor,
            policy: Arc::new(AlwaysRetry),
            config: CoordinatorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    #[must_use]
    pub const fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Enqueue a mutation directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be stored.
    pub fn enqueue(&self, item: SyncQueueItem) -> Result<SyncQueueItem, FieldSyncError> {
        self.queue.enqueue(item)
    }

    /// Run one drain if online and no drain is in flight.
    ///
    /// Each eligible item is attempted at most once per drain. A failure is
    /// recorded on the item and the drain moves on to the next one.
    pub async fn drain_now(&self) -> DrainReport {
        let permit = match self.monitor.guard().try_begin_drain() {
            Ok(permit) => permit,
            Err(DrainRefusal::Offline) => {
                debug!("offline; deferring drain");
                return DrainReport::new(DrainOutcome::Offline);
            },
            Err(DrainRefusal::AlreadyRunning) => {
                debug!("drain already in flight");
                return DrainReport::new(DrainOutcome::AlreadyRunning);
            },
        };

        let report = self.run_drain().await;
        drop(permit);

        info!(
            outcome = %report.outcome,
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            abandoned = report.abandoned,
            "drain finished"
        );
        report
    }

    async fn run_drain(&self) -> DrainReport {
        let mut report = DrainReport::new(DrainOutcome::Completed);
        let mut attempted = HashSet::new();

        loop {
            let batch = match self
                .queue
                .dequeue_batch_excluding(self.config.batch_size, &attempted)
            {
                Ok(batch) => batch,
                Err(e) => return report.storage_failed(&e),
            };
            if batch.is_empty() {
                return report;
            }

            for item in batch {
                if !self.monitor.guard().is_online() {
                    info!("went offline mid-drain; stopping");
                    report.outcome = DrainOutcome::StoppedOffline;
                    return report;
                }
                attempted.insert(item.id.clone());

                if let Err(e) = self.process(&item, &mut report).await {
                    return report.storage_failed(&e);
                }
            }
        }
    }

    async fn process(
        &self,
        item: &SyncQueueItem,
        report: &mut DrainReport,
    ) -> Result<(), FieldSyncError> {
        match self.policy.decide(item, now()) {
            RetryDecision::Attempt => {},
            RetryDecision::Wait(until) => {
                debug!(item_id = %item.id, retry_count = item.retry_count, %until, "backing off");
                report.skipped += 1;
                return Ok(());
            },
            RetryDecision::Abandon => {
                self.abandon(item)?;
                report.abandoned += 1;
                return Ok(());
            },
        }

        match self.apply(item).await {
            Ok(()) => {
                if self.store.acknowledge(item)? {
                    debug!(item_id = %item.id, entity = %item.entity_type, action = %item.action, "applied");
                    report.applied += 1;
                } else {
                    report.superseded += 1;
                }
            },
            Err(e) => {
                warn!(
                    item_id = %item.id,
                    entity = %item.entity_type,
                    action = %item.action,
                    retry_count = item.retry_count + 1,
                    error = %e,
                    "remote apply failed"
                );
                self.queue.record_failure(&item.id, &e.to_string())?;
                report.failed += 1;

                if let Some(updated) = self.queue.get(&item.id)? {
                    if self.policy.decide(&updated, now()) == RetryDecision::Abandon {
                        self.abandon(&updated)?;
                        report.abandoned += 1;
                    }
                }
            },
        }
        Ok(())
    }

    async fn apply(&self, item: &SyncQueueItem) -> Result<(), RemoteError> {
        let call = self
            .remote
            .apply(item.entity_type, item.action, &item.payload);
        match tokio::time::timeout(self.config.apply_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.config.apply_timeout)),
        }
    }

    fn abandon(&self, item: &SyncQueueItem) -> Result<(), FieldSyncError> {
        warn!(
            item_id = %item.id,
            entity = %item.entity_type,
            retry_count = item.retry_count,
            last_error = item.last_error.as_deref().unwrap_or(""),
            "giving up on item; moved to dead letters"
        );
        self.queue.mark_dead_letter(&item.id)?;
        Ok(())
    }

    /// Drain on every transition to online until the handle is shut down.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "dropping the handle stops the background task"]
    pub fn spawn_on_online(&self) -> OnlineDrainHandle {
        let mut status = self.monitor.watch();
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let coordinator = self.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Only transitions are published, so online here means we just came back
                        let online = status.borrow_and_update().is_online();
                        if online {
                            coordinator.drain_now().await;
                        }
                    },
                }
            }
            debug!("online drain task stopped");
        });

        OnlineDrainHandle { shutdown, task }
    }
}

/// Handle to the background task started by [`SyncCoordinator::spawn_on_online`].
#[derive(Debug)]
pub struct OnlineDrainHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl OnlineDrainHandle {
    /// Stop the task, letting an in-flight drain finish first.
    pub async fn shutdown(self) {
        // The task may already be gone
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "online drain task failed");
        }
    }
}
