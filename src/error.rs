//! Error types for fieldsync.

use thiserror::Error;

/// Errors surfaced by the local store, queue, configuration and CLI.
///
/// Remote failures never reach callers through this type during a drain;
/// they are recorded on the queue item instead (see [`crate::sync::RemoteError`]).
#[derive(Debug, Error)]
pub enum FieldSyncError {
    /// Durable read or write failed (quota, corruption, locked file).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be read, parsed or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record or queue item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A payload or stored value could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// `list_by_index` was called with an index the collection does not declare.
    #[error("Collection '{collection}' has no index named '{index}'")]
    UnknownIndex {
        /// Collection (table) name.
        collection: &'static str,
        /// Requested index name.
        index: String,
    },

    /// Remote endpoint setup failed (bad URL, client construction).
    #[error("Remote error: {0}")]
    Remote(String),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FieldSyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl FieldSyncError {
    /// Wrap a `SQLite` error with context as a storage error.
    pub(crate) fn storage(context: &str, e: &rusqlite::Error) -> Self {
        Self::Storage(format!("{context}: {e}"))
    }
}
