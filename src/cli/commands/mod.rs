//! Command implementations for fieldsync.
//!
//! This module contains the implementation of all CLI commands.

mod queue;
mod record;
mod sync;

pub use queue::queue;
pub use record::{delete, record, records};
pub use sync::{drain, status, watch_status};
