//! Durable keyed collections for the domain records.
//!
//! [`LocalStore`] is the explicitly constructed store handle shared by the
//! capturing workflows and the sync coordinator. Every call commits before it
//! returns; storage failures surface as [`FieldSyncError::Storage`] and are
//! never retried here.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::Database;
use crate::error::FieldSyncError;
use crate::records::{Entity, EntityKind, LocationPoint, Trip, SYNC_COLUMN};
use crate::sync::item::{format_timestamp, now};
use crate::sync::queue::{enqueue_on, get_on, remove_if_revision};
use crate::sync::{SyncAction, SyncQueue, SyncQueueItem};

/// Handle to the local store.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct LocalStore {
    db: Database,
}

impl LocalStore {
    /// Open (or create) the store at a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, FieldSyncError> {
        Ok(Self {
            db: Database::open_at(path)?,
        })
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, FieldSyncError> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }

    /// Sync queue sharing this store's database.
    #[must_use]
    pub fn queue(&self) -> SyncQueue {
        SyncQueue::with_database(self.db.clone())
    }

    /// Release this handle, closing the database if it was the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection does not close cleanly.
    pub fn close(self) -> Result<(), FieldSyncError> {
        self.db.close()
    }

    /// Insert or replace a record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn put<E: Entity>(&self, record: &E) -> Result<(), FieldSyncError> {
        self.db.with_conn(|conn| write_record(conn, record))
    }

    /// Get a record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored JSON is invalid.
    pub fn get<E: Entity>(&self, id: &str) -> Result<Option<E>, FieldSyncError> {
        self.db.with_conn(|conn| read_record(conn, id))
    }

    /// Delete a record by ID. Returns whether it existed.
    ///
    /// This is a local delete only; use [`record_deletion`](Self::record_deletion)
    /// for a user-initiated delete that must reach the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete<E: Entity>(&self, id: &str) -> Result<bool, FieldSyncError> {
        self.delete_raw(E::KIND, id)
    }

    /// All records in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn list_all<E: Entity>(&self) -> Result<Vec<E>, FieldSyncError> {
        self.list_raw(E::KIND, None)?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(FieldSyncError::from))
            .collect()
    }

    /// Records whose declared index equals `value`.
    ///
    /// For `by_sync`, `value` is `true`/`false` (or `1`/`0`).
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` for an undeclared index, or a storage error.
    pub fn list_by_index<E: Entity>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Vec<E>, FieldSyncError> {
        self.list_raw(E::KIND, Some((index, value)))?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(FieldSyncError::from))
            .collect()
    }

    /// Kind-erased record lookup, returning the stored JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_raw(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<serde_json::Value>, FieldSyncError> {
        self.db.with_conn(|conn| read_raw(conn, kind, id))
    }

    /// Kind-erased listing, optionally filtered by a declared index.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` for an undeclared index, or a storage error.
    pub fn list_raw(
        &self,
        kind: EntityKind,
        filter: Option<(&str, &str)>,
    ) -> Result<Vec<serde_json::Value>, FieldSyncError> {
        let (sql, param) = match filter {
            None => (format!("SELECT data FROM {} ORDER BY id", kind.table()), None),
            Some((index, value)) => {
                let def = kind.index(index).ok_or_else(|| FieldSyncError::UnknownIndex {
                    collection: kind.table(),
                    index: index.to_string(),
                })?;
                let param = if def.column == SYNC_COLUMN {
                    Value::Integer(i64::from(parse_sync_flag(value)?))
                } else {
                    Value::Text(value.to_string())
                };
                (
                    format!(
                        "SELECT data FROM {} WHERE {} = ?1 ORDER BY id",
                        kind.table(),
                        def.column
                    ),
                    Some(param),
                )
            },
        };

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| FieldSyncError::storage("Failed to prepare query", &e))?;
            let rows = stmt
                .query_map(params_from_iter(param.iter()), |row| row.get::<_, String>(0))
                .map_err(|e| FieldSyncError::storage("Failed to list records", &e))?;

            let mut records = Vec::new();
            for row in rows {
                let data = row.map_err(|e| FieldSyncError::storage("Failed to read record", &e))?;
                records.push(serde_json::from_str(&data)?);
            }
            Ok(records)
        })
    }

    /// Kind-erased delete. Returns whether the record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_raw(&self, kind: EntityKind, id: &str) -> Result<bool, FieldSyncError> {
        self.db.with_conn(|conn| delete_on(conn, kind, id))
    }

    /// Set `syncedToServer = true` on a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_synced(&self, kind: EntityKind, id: &str) -> Result<bool, FieldSyncError> {
        self.db.with_conn(|conn| mark_synced_on(conn, kind, id))
    }

    /// Write a record and enqueue its mutation in one transaction.
    ///
    /// The stored record always has `syncedToServer = false`. Returns the
    /// queue item as stored (which may be an existing item the change was
    /// merged into).
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails; neither is applied then.
    pub fn record_change<E: Entity>(
        &self,
        record: &E,
        action: SyncAction,
    ) -> Result<SyncQueueItem, FieldSyncError> {
        let mut record = record.clone();
        record.set_synced_to_server(false);
        let item = SyncQueueItem::for_record(&record, action)?;

        self.db.transaction(|tx| {
            write_record(tx, &record)?;
            enqueue_on(tx, item)
        })
    }

    /// Enqueue a user-initiated delete for an existing record.
    ///
    /// The record stays in the store until the remote endpoint acknowledges
    /// the delete.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub fn record_deletion(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<SyncQueueItem, FieldSyncError> {
        self.db.transaction(|tx| {
            if read_raw(tx, kind, id)?.is_none() {
                return Err(FieldSyncError::NotFound(format!("{} {id}", kind.display_name())));
            }
            enqueue_on(tx, SyncQueueItem::deletion(kind, id))
        })
    }

    /// Append a GPS fix to a trip's route and enqueue the update atomically.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the trip does not exist.
    pub fn append_location(
        &self,
        trip_id: &str,
        point: LocationPoint,
    ) -> Result<SyncQueueItem, FieldSyncError> {
        self.db.transaction(|tx| {
            let mut trip: Trip = read_record(tx, trip_id)?
                .ok_or_else(|| FieldSyncError::NotFound(format!("Trip {trip_id}")))?;
            trip.route.push(point);
            trip.synced_to_server = false;

            write_record(tx, &trip)?;
            enqueue_on(tx, SyncQueueItem::for_record(&trip, SyncAction::Update)?)
        })
    }

    /// Apply a remote acknowledgement for a queue item.
    ///
    /// In one transaction: if the item still has the acknowledged revision,
    /// mark the record synced (create/update) or delete it (delete) and
    /// remove the item. If a newer mutation was merged in meanwhile, nothing
    /// changes and `false` is returned so the newer payload is still sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn acknowledge(&self, item: &SyncQueueItem) -> Result<bool, FieldSyncError> {
        self.db.transaction(|tx| {
            let Some(current) = get_on(tx, &item.id)? else {
                debug!(item_id = %item.id, "acknowledged item already gone");
                return Ok(false);
            };
            if current.revision != item.revision {
                debug!(
                    item_id = %item.id,
                    acked = item.revision,
                    current = current.revision,
                    "item changed while in flight; keeping it queued"
                );
                return Ok(false);
            }

            let found = match item.action {
                SyncAction::Create | SyncAction::Update => {
                    mark_synced_on(tx, item.entity_type, &item.record_id)?
                },
                SyncAction::Delete => delete_on(tx, item.entity_type, &item.record_id)?,
            };
            if !found {
                warn!(
                    item_id = %item.id,
                    entity = %item.entity_type,
                    record_id = %item.record_id,
                    "acknowledged record missing from local store"
                );
            }

            remove_if_revision(tx, &item.id, item.revision)
        })
    }
}

fn parse_sync_flag(value: &str) -> Result<bool, FieldSyncError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "synced" => Ok(true),
        "false" | "0" | "unsynced" => Ok(false),
        other => Err(FieldSyncError::Parse(format!(
            "Expected true/false for by_sync, got '{other}'"
        ))),
    }
}

fn write_record<E: Entity>(conn: &Connection, record: &E) -> Result<(), FieldSyncError> {
    let kind = E::KIND;
    let data = serde_json::to_string(record)?;

    let columns: Vec<&str> = kind.value_columns().collect();
    let mut values = vec![
        Value::Text(record.id().to_string()),
        Value::Text(data),
        Value::Integer(i64::from(record.synced_to_server())),
        Value::Text(format_timestamp(now())),
    ];
    values.extend(
        columns
            .iter()
            .map(|column| record.index_value(column).map_or(Value::Null, Value::Text)),
    );

    let placeholders: Vec<String> = (1..=values.len()).map(|n| format!("?{n}")).collect();
    let sql = format!(
        "INSERT OR REPLACE INTO {} (id, data, {SYNC_COLUMN}, updated_at{}) VALUES ({})",
        kind.table(),
        columns.iter().map(|c| format!(", {c}")).collect::<String>(),
        placeholders.join(", "),
    );

    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| FieldSyncError::storage(&format!("Failed to write {}", kind.table()), &e))?;
    Ok(())
}

fn read_raw(
    conn: &Connection,
    kind: EntityKind,
    id: &str,
) -> Result<Option<serde_json::Value>, FieldSyncError> {
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?1", kind.table()),
            [id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| FieldSyncError::storage(&format!("Failed to read {}", kind.table()), &e))?;

    data.map(|d| serde_json::from_str(&d).map_err(FieldSyncError::from))
        .transpose()
}

fn read_record<E: Entity>(conn: &Connection, id: &str) -> Result<Option<E>, FieldSyncError> {
    read_raw(conn, E::KIND, id)?
        .map(|value| serde_json::from_value(value).map_err(FieldSyncError::from))
        .transpose()
}

fn delete_on(conn: &Connection, kind: EntityKind, id: &str) -> Result<bool, FieldSyncError> {
    let rows = conn
        .execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), [id])
        .map_err(|e| FieldSyncError::storage(&format!("Failed to delete from {}", kind.table()), &e))?;
    Ok(rows > 0)
}

fn mark_synced_on(conn: &Connection, kind: EntityKind, id: &str) -> Result<bool, FieldSyncError> {
    let Some(mut value) = read_raw(conn, kind, id)? else {
        return Ok(false);
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("syncedToServer".to_string(), serde_json::Value::Bool(true));
    }

    conn.execute(
        &format!(
            "UPDATE {} SET data = ?1, {SYNC_COLUMN} = 1, updated_at = ?2 WHERE id = ?3",
            kind.table()
        ),
        params![value.to_string(), format_timestamp(now()), id],
    )
    .map_err(|e| FieldSyncError::storage(&format!("Failed to update {}", kind.table()), &e))?;
    Ok(true)
}
