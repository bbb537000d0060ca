//! Storage layer for fieldsync.
//!
//! This module provides SQLite-based persistence for:
//! - Domain records (trips, fuel entries, camera reports, handovers, photos)
//! - The sync queue (pending mutations)

mod database;
mod migrations;
mod store;

pub use database::Database;
pub use store::LocalStore;
