//! `SQLite` database connection and operations.
//!
//! The database is stored at `~/.fieldsync/fieldsync.db` and contains one
//! table per entity collection plus the `sync_queue` table.
//!
//! Every write runs in WAL mode with `synchronous = FULL`, so a committed
//! statement or transaction is on disk before the call returns.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::FieldSyncError;

use super::migrations;

/// How long a writer waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared, thread-safe database handle.
///
/// Cloning is cheap; all clones share one connection, and access is
/// serialized through a mutex held only for the duration of one statement
/// or transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &Path) -> Result<Self, FieldSyncError> {
        let conn = Connection::open(path).map_err(|e| {
            FieldSyncError::Storage(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // journal_mode reports the resulting mode as a row
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| FieldSyncError::storage("Failed to enable WAL", &e))?;

        Self::init(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, FieldSyncError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FieldSyncError::storage("Failed to open in-memory database", &e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, FieldSyncError> {
        conn.execute_batch("PRAGMA synchronous = FULL; PRAGMA foreign_keys = ON;")
            .map_err(|e| FieldSyncError::storage("Failed to configure database", &e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| FieldSyncError::storage("Failed to set busy timeout", &e))?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, FieldSyncError> {
        self.with_conn(migrations::get_version)
    }

    /// Run a closure against the connection.
    ///
    /// The connection lock is held until the closure returns; do not await
    /// or call back into the database from inside it.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, FieldSyncError>,
    ) -> Result<T, FieldSyncError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a closure inside an immediate transaction.
    ///
    /// The transaction commits if the closure returns `Ok`, and rolls back
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a storage error if begin/commit fails.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, FieldSyncError>,
    ) -> Result<T, FieldSyncError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| FieldSyncError::storage("Failed to begin transaction", &e))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| FieldSyncError::storage("Failed to commit transaction", &e))?;
        Ok(value)
    }

    /// Close the connection.
    ///
    /// If other handles still share the connection, this only releases this
    /// handle; the connection closes when the last handle goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` fails to close the connection cleanly.
    pub fn close(self) -> Result<(), FieldSyncError> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => mutex
                .into_inner()
                .close()
                .map_err(|(_, e)| FieldSyncError::storage("Failed to close database", &e)),
            Err(_shared) => Ok(()),
        }
    }
}
