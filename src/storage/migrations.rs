//! Database migrations for fieldsync.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::FieldSyncError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, FieldSyncError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| FieldSyncError::storage("Failed to get schema version", &e))
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), FieldSyncError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| FieldSyncError::storage("Failed to set schema version", &e))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), FieldSyncError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

/// Run a specific migration.
fn run_migration(conn: &Connection, version: i32) -> Result<(), FieldSyncError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(FieldSyncError::Storage(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Record tables keep the full record as JSON in `data`; index columns are
/// denormalized copies maintained by the store on every write.
fn migrate_v1(conn: &Connection) -> Result<(), FieldSyncError> {
    conn.execute_batch(
        r"
        BEGIN;

        CREATE TABLE IF NOT EXISTS trips (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            synced_to_server INTEGER NOT NULL DEFAULT 0,
            vehicle_id TEXT,
            status TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_trips_vehicle ON trips(vehicle_id);
        CREATE INDEX IF NOT EXISTS idx_trips_status ON trips(status);
        CREATE INDEX IF NOT EXISTS idx_trips_sync ON trips(synced_to_server);

        CREATE TABLE IF NOT EXISTS fuel_entries (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            synced_to_server INTEGER NOT NULL DEFAULT 0,
            trip_id TEXT,
            vehicle_id TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fuel_entries_trip ON fuel_entries(trip_id);
        CREATE INDEX IF NOT EXISTS idx_fuel_entries_vehicle ON fuel_entries(vehicle_id);
        CREATE INDEX IF NOT EXISTS idx_fuel_entries_sync ON fuel_entries(synced_to_server);

        CREATE TABLE IF NOT EXISTS camera_reports (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            synced_to_server INTEGER NOT NULL DEFAULT 0,
            trip_id TEXT,
            status TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_camera_reports_trip ON camera_reports(trip_id);
        CREATE INDEX IF NOT EXISTS idx_camera_reports_status ON camera_reports(status);
        CREATE INDEX IF NOT EXISTS idx_camera_reports_sync ON camera_reports(synced_to_server);

        CREATE TABLE IF NOT EXISTS handovers (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            synced_to_server INTEGER NOT NULL DEFAULT 0,
            vehicle_id TEXT,
            status TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_handovers_vehicle ON handovers(vehicle_id);
        CREATE INDEX IF NOT EXISTS idx_handovers_status ON handovers(status);
        CREATE INDEX IF NOT EXISTS idx_handovers_sync ON handovers(synced_to_server);

        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            synced_to_server INTEGER NOT NULL DEFAULT 0,
            owner TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_photos_owner ON photos(owner);
        CREATE INDEX IF NOT EXISTS idx_photos_sync ON photos(synced_to_server);

        -- Pending mutations, at most one open item per record
        CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            record_id TEXT NOT NULL,
            action TEXT NOT NULL,
            payload BLOB NOT NULL,
            enqueued_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            last_attempt_at TEXT,
            dead_letter INTEGER NOT NULL DEFAULT 0,
            revision INTEGER NOT NULL DEFAULT 0,
            UNIQUE (entity_type, record_id)
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_fifo
        ON sync_queue(dead_letter, enqueued_at);

        COMMIT;
        ",
    )
    .map_err(|e| FieldSyncError::storage("Migration v1 failed", &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::EntityKind;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO sync_queue (id, entity_type, record_id, action, payload, enqueued_at)
             VALUES ('q1', 'fuel', 'f1', 'create', x'7b7d', '2024-01-01T10:00:00.000000Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_declared_index_columns_exist() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        for kind in EntityKind::ALL {
            let columns: Vec<&str> = kind.indexes().iter().map(|def| def.column).collect();
            let sql = format!(
                "SELECT id, data, updated_at, {} FROM {}",
                columns.join(", "),
                kind.table()
            );
            conn.prepare(&sql)
                .unwrap_or_else(|e| panic!("{}: {e}", kind.table()));
        }
    }

    #[test]
    fn test_queue_rejects_duplicate_record() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let insert = "INSERT INTO sync_queue (id, entity_type, record_id, action, payload, enqueued_at)
                      VALUES (?1, 'trip', 't1', 'create', x'00', '2024-01-01T10:00:00.000000Z')";
        conn.execute(insert, ["q1"]).unwrap();
        assert!(conn.execute(insert, ["q2"]).is_err());
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }
}
