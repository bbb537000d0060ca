//! Offline sync engine.
//!
//! Local writes enqueue a [`SyncQueueItem`] in the same transaction as the
//! record itself. The [`SyncCoordinator`] drains the queue against a
//! [`RemoteEndpoint`] whenever the [`NetworkMonitor`] reports connectivity,
//! and the [`StatusReporter`] turns queue and network state into a status
//! users can see.
//!
//! Features:
//! - At most one open item per record; newer edits replace the payload
//! - FIFO draining with per-item failure isolation
//! - Pluggable retry policy with a dead-letter view
//! - Single-drain guard shared with the connectivity flag

mod coordinator;
mod guard;
pub(crate) mod item;
mod network;
mod policy;
pub(crate) mod queue;
mod remote;
mod status;

pub use coordinator::{
    CoordinatorConfig, DrainOutcome, DrainReport, OnlineDrainHandle, SyncCoordinator,
};
pub use guard::{DrainPermit, DrainRefusal, SyncGuard};
pub use item::{SyncAction, SyncQueueItem};
pub use network::{ConnectivityProbe, NetworkMonitor, NetworkStatus, Subscription, TcpProbe};
pub use policy::{AlwaysRetry, ExponentialBackoff, RetryDecision, RetryPolicy};
pub use queue::{QueueStats, SyncQueue};
pub use remote::{HttpRemote, RemoteEndpoint, RemoteError};
pub use status::{PendingCounter, StatusReporter, StatusSnapshot, StatusWatch, SyncStatus};
