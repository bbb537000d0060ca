//! Read-only sync status derived from the queue and the network monitor.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::network::NetworkMonitor;
use super::queue::SyncQueue;
use crate::error::FieldSyncError;

/// Human-observable sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "count")]
pub enum SyncStatus {
    Offline,
    /// Online with this many changes not yet acknowledged
    Pending(usize),
    Synced,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Pending(n) => write!(f, "{n} pending"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// Caller-owned count of pending work that is not in the queue yet
/// (e.g. a form being saved).
#[derive(Debug, Clone, Default)]
pub struct PendingCounter {
    count: Arc<AtomicUsize>,
}

impl PendingCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement, never going below zero.
    pub fn decrement(&self) {
        // Err only means it was already zero
        let _ = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Point-in-time view for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    pub network: String,
    /// Open queue items plus registered counters
    pub pending: usize,
    pub dead_letters: usize,
    /// Most recent remote failure among open items
    pub last_error: Option<String>,
}

/// Derives [`SyncStatus`] on demand or on a polling interval.
#[derive(Clone)]
pub struct StatusReporter {
    queue: SyncQueue,
    monitor: NetworkMonitor,
    counters: Arc<Mutex<Vec<PendingCounter>>>,
    poll_interval: Duration,
}

impl StatusReporter {
    #[must_use]
    pub fn new(queue: SyncQueue, monitor: NetworkMonitor) -> Self {
        Self {
            queue,
            monitor,
            counters: Arc::new(Mutex::new(Vec::new())),
            poll_interval: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    /// Include a transient counter in [`pending_count`](Self::pending_count).
    pub fn register_counter(&self, counter: &PendingCounter) {
        self.counters.lock().push(counter.clone());
    }

    /// Open queue items (dead letters included) plus registered counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn pending_count(&self) -> Result<usize, FieldSyncError> {
        let queued = self.queue.open_count()?;
        let transient: usize = self.counters.lock().iter().map(PendingCounter::get).sum();
        Ok(queued + transient)
    }

    /// Current status.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn status(&self) -> Result<SyncStatus, FieldSyncError> {
        if !self.monitor.current_status().is_online() {
            return Ok(SyncStatus::Offline);
        }
        Ok(match self.pending_count()? {
            0 => SyncStatus::Synced,
            n => SyncStatus::Pending(n),
        })
    }

    /// Status plus the details behind it.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn snapshot(&self) -> Result<StatusSnapshot, FieldSyncError> {
        Ok(StatusSnapshot {
            status: self.status()?,
            network: self.monitor.current_status().to_string(),
            pending: self.pending_count()?,
            dead_letters: self.queue.stats()?.dead_letters,
            last_error: self.queue.latest_error()?,
        })
    }

    /// Call `callback` whenever the status changes.
    ///
    /// Status is recomputed every poll interval and on every network
    /// transition. Must be called from within a tokio runtime.
    #[must_use = "dropping the handle stops watching"]
    pub fn on_status_change<F>(&self, callback: F) -> StatusWatch
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        let reporter = self.clone();
        let mut network = self.monitor.watch();
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let mut last = self.status().ok();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(reporter.poll_interval) => {},
                    changed = network.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        network.borrow_and_update();
                    },
                }

                let current = match reporter.status() {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(error = %e, "failed to compute sync status");
                        continue;
                    },
                };
                if last != Some(current) {
                    debug!(status = %current, "sync status changed");
                    if catch_unwind(AssertUnwindSafe(|| callback(current))).is_err() {
                        error!(status = %current, "status callback panicked");
                    }
                    last = Some(current);
                }
            }
        });

        StatusWatch { shutdown, task }
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("monitor", &self.monitor)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Handle to a status polling task.
#[derive(Debug)]
pub struct StatusWatch {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl StatusWatch {
    /// Stop polling and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "status task failed");
        }
    }
}
