//! fieldsync - offline-first record store and sync engine
//!
//! This crate keeps field records (trips, fuel entries, camera reports,
//! handovers and photos) in a local `SQLite` database, queues every change
//! durably, and replays the queue against a remote endpoint whenever the
//! network is available.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod records;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::FieldSyncError;
pub use records::{Entity, EntityKind};
pub use storage::LocalStore;
pub use sync::{
    NetworkMonitor, NetworkStatus, RemoteEndpoint, StatusReporter, SyncAction, SyncCoordinator,
    SyncQueue, SyncQueueItem, SyncStatus,
};
