//! Sync queue storage and management.
//!
//! The queue is an ordered, durable log of pending mutations kept in the
//! `sync_queue` table. At most one open item exists per record: enqueuing a
//! newer mutation for a record that already has an open item replaces the
//! payload in place and keeps the failure history.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::item::{format_timestamp, now, SyncAction, SyncQueueItem};
use crate::error::FieldSyncError;
use crate::records::EntityKind;
use crate::storage::Database;

const SELECT_COLUMNS: &str = "SELECT id, entity_type, record_id, action, payload, enqueued_at,
                                     retry_count, last_error, last_attempt_at, dead_letter, revision
                              FROM sync_queue";

/// Sync queue backed by the local store's database.
#[derive(Clone)]
pub struct SyncQueue {
    db: Database,
}

impl SyncQueue {
    /// Create a sync queue over an existing database handle.
    #[must_use]
    pub const fn with_database(db: Database) -> Self {
        Self { db }
    }

    /// Add an item, merging it into the open item for the same record if
    /// one exists.
    ///
    /// Returns the item as stored. On merge the stored item keeps its
    /// original `id`, `retry_count`, `last_error` and dead-letter flag, and
    /// takes the new payload, action and `enqueued_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be saved.
    pub fn enqueue(&self, item: SyncQueueItem) -> Result<SyncQueueItem, FieldSyncError> {
        self.db.transaction(|tx| enqueue_on(tx, item))
    }

    /// Open items ordered oldest first, capped at `max`.
    ///
    /// Dead-lettered items are not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dequeue_batch(&self, max: usize) -> Result<Vec<SyncQueueItem>, FieldSyncError> {
        self.dequeue_batch_excluding(max, &HashSet::new())
    }

    /// Like [`dequeue_batch`](Self::dequeue_batch), skipping the given item IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dequeue_batch_excluding(
        &self,
        max: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<SyncQueueItem>, FieldSyncError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(max.saturating_add(exclude.len())).unwrap_or(i64::MAX);

        let mut items = self.query(
            &format!(
                "{SELECT_COLUMNS} WHERE dead_letter = 0 ORDER BY enqueued_at ASC, rowid ASC LIMIT ?1"
            ),
            &[&limit],
        )?;

        items.retain(|item| !exclude.contains(&item.id));
        items.truncate(max);
        Ok(items)
    }

    /// Delete an item after the remote endpoint acknowledged it.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&self, id: &str) -> Result<bool, FieldSyncError> {
        self.db.with_conn(|conn| {
            let rows = conn
                .execute("DELETE FROM sync_queue WHERE id = ?1", [id])
                .map_err(|e| FieldSyncError::storage("Failed to remove queue item", &e))?;
            Ok(rows > 0)
        })
    }

    /// Record a failed remote attempt: increments `retry_count`, stores the
    /// error and leaves the item queued.
    ///
    /// Returns `false` if the item no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn record_failure(&self, id: &str, error: &str) -> Result<bool, FieldSyncError> {
        self.db.with_conn(|conn| {
            let rows = conn
                .execute(
                    r"UPDATE sync_queue SET
                      retry_count = retry_count + 1,
                      last_error = ?1,
                      last_attempt_at = ?2
                      WHERE id = ?3",
                    params![error, format_timestamp(now()), id],
                )
                .map_err(|e| FieldSyncError::storage("Failed to record failure", &e))?;
            Ok(rows > 0)
        })
    }

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<SyncQueueItem>, FieldSyncError> {
        self.db.with_conn(|conn| get_on(conn, id))
    }

    /// Get the open item for a record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_for_record(
        &self,
        kind: EntityKind,
        record_id: &str,
    ) -> Result<Option<SyncQueueItem>, FieldSyncError> {
        self.db.with_conn(|conn| get_for_record_on(conn, kind, record_id))
    }

    /// All open items, oldest first, including dead letters.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_all(&self) -> Result<Vec<SyncQueueItem>, FieldSyncError> {
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY enqueued_at ASC, rowid ASC"),
            &[],
        )
    }

    /// Items the retry policy has given up on.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dead_letters(&self) -> Result<Vec<SyncQueueItem>, FieldSyncError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE dead_letter = 1 ORDER BY enqueued_at ASC, rowid ASC"),
            &[],
        )
    }

    /// Number of open items, dead letters included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn open_count(&self) -> Result<usize, FieldSyncError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))
                .map_err(|e| FieldSyncError::storage("Failed to count queue", &e))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    /// Most recent `last_error` among open items.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_error(&self) -> Result<Option<String>, FieldSyncError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                r"SELECT last_error FROM sync_queue
                  WHERE last_error IS NOT NULL
                  ORDER BY last_attempt_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| FieldSyncError::storage("Failed to read latest error", &e))
        })
    }

    /// Move an item to the dead-letter view.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_dead_letter(&self, id: &str) -> Result<bool, FieldSyncError> {
        self.db.with_conn(|conn| {
            let rows = conn
                .execute("UPDATE sync_queue SET dead_letter = 1 WHERE id = ?1", [id])
                .map_err(|e| FieldSyncError::storage("Failed to mark dead letter", &e))?;
            Ok(rows > 0)
        })
    }

    /// Put a dead-lettered item back in line with a clean failure history.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the item does not exist.
    pub fn requeue(&self, id: &str) -> Result<(), FieldSyncError> {
        self.db.with_conn(|conn| {
            let rows = conn
                .execute(
                    r"UPDATE sync_queue SET
                      dead_letter = 0,
                      retry_count = 0,
                      last_error = NULL,
                      last_attempt_at = NULL
                      WHERE id = ?1",
                    [id],
                )
                .map_err(|e| FieldSyncError::storage("Failed to requeue item", &e))?;
            if rows == 0 {
                return Err(FieldSyncError::NotFound(format!("Queue item {id}")));
            }
            Ok(())
        })
    }

    /// Get queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, FieldSyncError> {
        self.db.with_conn(|conn| {
            let (open, failing, dead_letters): (i64, i64, i64) = conn
                .query_row(
                    r"SELECT COUNT(*),
                             COALESCE(SUM(retry_count > 0), 0),
                             COALESCE(SUM(dead_letter), 0)
                      FROM sync_queue",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| FieldSyncError::storage("Failed to count queue", &e))?;

            let oldest: Option<String> = conn
                .query_row(
                    "SELECT enqueued_at FROM sync_queue ORDER BY enqueued_at ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| FieldSyncError::storage("Failed to get oldest item", &e))?;

            Ok(QueueStats {
                open: usize::try_from(open).unwrap_or(0),
                failing: usize::try_from(failing).unwrap_or(0),
                dead_letters: usize::try_from(dead_letters).unwrap_or(0),
                oldest_enqueued_at: oldest.as_deref().and_then(parse_timestamp),
            })
        })
    }

    /// Remove every item (operator reset).
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<usize, FieldSyncError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM sync_queue", [])
                .map_err(|e| FieldSyncError::storage("Failed to clear queue", &e))
        })
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<SyncQueueItem>, FieldSyncError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| FieldSyncError::storage("Failed to prepare query", &e))?;

            let rows = stmt
                .query_map(params, row_to_item)
                .map_err(|e| FieldSyncError::storage("Failed to query queue", &e))?;

            let items = rows
                .map(|row| row.map_err(|e| FieldSyncError::storage("Failed to read queue item", &e)))
                .collect::<Result<Vec<_>, _>>();
            items
        })
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Open items, dead letters included
    pub open: usize,
    /// Open items with at least one failed attempt
    pub failing: usize,
    /// Items the retry policy gave up on
    pub dead_letters: usize,
    /// Oldest open item timestamp
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

/// Enqueue on an existing connection or transaction.
pub(crate) fn enqueue_on(
    conn: &Connection,
    item: SyncQueueItem,
) -> Result<SyncQueueItem, FieldSyncError> {
    match get_for_record_on(conn, item.entity_type, &item.record_id)? {
        None => {
            conn.execute(
                r"INSERT INTO sync_queue
                  (id, entity_type, record_id, action, payload, enqueued_at,
                   retry_count, last_error, last_attempt_at, dead_letter, revision)
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id,
                    item.entity_type.as_str(),
                    item.record_id,
                    item.action.as_str(),
                    item.payload,
                    format_timestamp(item.enqueued_at),
                    item.retry_count,
                    item.last_error,
                    item.last_attempt_at.map(format_timestamp),
                    item.dead_letter,
                    item.revision,
                ],
            )
            .map_err(|e| FieldSyncError::storage("Failed to enqueue item", &e))?;

            debug!(item_id = %item.id, entity = %item.entity_type, action = %item.action, "enqueued");
            Ok(item)
        },
        Some(existing) => {
            let merged = SyncQueueItem {
                action: existing.action.merge(item.action),
                payload: item.payload,
                enqueued_at: item.enqueued_at,
                revision: existing.revision + 1,
                ..existing
            };

            conn.execute(
                r"UPDATE sync_queue SET
                  action = ?1,
                  payload = ?2,
                  enqueued_at = ?3,
                  revision = ?4
                  WHERE id = ?5",
                params![
                    merged.action.as_str(),
                    merged.payload,
                    format_timestamp(merged.enqueued_at),
                    merged.revision,
                    merged.id,
                ],
            )
            .map_err(|e| FieldSyncError::storage("Failed to merge queue item", &e))?;

            if merged.dead_letter {
                warn!(
                    item_id = %merged.id,
                    entity = %merged.entity_type,
                    record_id = %merged.record_id,
                    "edit merged into a dead letter; it will not be sent until requeued"
                );
            }
            debug!(
                item_id = %merged.id,
                entity = %merged.entity_type,
                action = %merged.action,
                retry_count = merged.retry_count,
                "merged into open item"
            );
            Ok(merged)
        },
    }
}

pub(crate) fn get_on(conn: &Connection, id: &str) -> Result<Option<SyncQueueItem>, FieldSyncError> {
    conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], row_to_item)
        .optional()
        .map_err(|e| FieldSyncError::storage("Failed to query queue item", &e))
}

fn get_for_record_on(
    conn: &Connection,
    kind: EntityKind,
    record_id: &str,
) -> Result<Option<SyncQueueItem>, FieldSyncError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE entity_type = ?1 AND record_id = ?2"),
        params![kind.as_str(), record_id],
        row_to_item,
    )
    .optional()
    .map_err(|e| FieldSyncError::storage("Failed to query queue item", &e))
}

/// Remove an item only if no newer mutation was merged into it.
pub(crate) fn remove_if_revision(
    conn: &Connection,
    id: &str,
    revision: i64,
) -> Result<bool, FieldSyncError> {
    let rows = conn
        .execute(
            "DELETE FROM sync_queue WHERE id = ?1 AND revision = ?2",
            params![id, revision],
        )
        .map_err(|e| FieldSyncError::storage("Failed to remove queue item", &e))?;
    Ok(rows > 0)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn row_to_item(row: &Row<'_>) -> Result<SyncQueueItem, rusqlite::Error> {
    let entity_str: String = row.get(1)?;
    let action_str: String = row.get(3)?;
    let enqueued_str: String = row.get(5)?;
    let last_attempt_str: Option<String> = row.get(8)?;

    let entity_type = EntityKind::parse(&entity_str)
        .ok_or_else(|| conversion_error(1, format!("unknown entity type {entity_str}")))?;
    let action = SyncAction::parse(&action_str)
        .ok_or_else(|| conversion_error(3, format!("unknown action {action_str}")))?;
    let enqueued_at = parse_timestamp(&enqueued_str)
        .ok_or_else(|| conversion_error(5, format!("bad timestamp {enqueued_str}")))?;

    Ok(SyncQueueItem {
        id: row.get(0)?,
        entity_type,
        record_id: row.get(2)?,
        action,
        payload: row.get(4)?,
        enqueued_at,
        retry_count: row.get(6)?,
        last_error: row.get(7)?,
        last_attempt_at: last_attempt_str.as_deref().and_then(parse_timestamp),
        dead_letter: row.get(9)?,
        revision: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_queue() -> SyncQueue {
        let db = Database::open_in_memory().unwrap();
        SyncQueue::with_database(db)
    }

    fn item(id: &str, record_id: &str, payload: &str) -> SyncQueueItem {
        SyncQueueItem::new(
            id,
            EntityKind::Fuel,
            record_id,
            SyncAction::Create,
            payload.as_bytes().to_vec(),
        )
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        parse_timestamp("2024-06-01T08:00:00Z").unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn test_enqueue_and_get() {
        let queue = create_test_queue();

        let stored = queue.enqueue(item("q1", "f1", "{}")).unwrap();
        let loaded = queue.get("q1").unwrap().unwrap();

        assert_eq!(loaded, stored);
        assert_eq!(loaded.retry_count, 0);
        assert!(!loaded.dead_letter);
    }

    #[test]
    fn test_enqueue_merges_same_record() {
        let queue = create_test_queue();

        queue.enqueue(item("q1", "f1", "v1").with_enqueued_at(at(0))).unwrap();
        queue.record_failure("q1", "timeout").unwrap();
        queue.record_failure("q1", "503").unwrap();

        let mut newer = item("q2", "f1", "v2").with_enqueued_at(at(10));
        newer.action = SyncAction::Update;
        let merged = queue.enqueue(newer).unwrap();

        assert_eq!(queue.open_count().unwrap(), 1);
        assert_eq!(merged.id, "q1");
        assert_eq!(merged.payload, b"v2");
        assert_eq!(merged.action, SyncAction::Create);
        assert_eq!(merged.retry_count, 2);
        assert_eq!(merged.last_error.as_deref(), Some("503"));
        assert_eq!(merged.enqueued_at, at(10));
        assert_eq!(merged.revision, 1);
        assert!(queue.get("q2").unwrap().is_none());
    }

    #[test]
    fn test_same_record_id_different_kind_not_merged() {
        let queue = create_test_queue();

        queue.enqueue(item("q1", "x1", "{}")).unwrap();
        let mut trip = item("q2", "x1", "{}");
        trip.entity_type = EntityKind::Trip;
        queue.enqueue(trip).unwrap();

        assert_eq!(queue.open_count().unwrap(), 2);
    }

    #[test]
    fn test_dequeue_batch_fifo() {
        let queue = create_test_queue();

        queue.enqueue(item("late", "f3", "{}").with_enqueued_at(at(30))).unwrap();
        queue.enqueue(item("early", "f1", "{}").with_enqueued_at(at(10))).unwrap();
        queue.enqueue(item("mid", "f2", "{}").with_enqueued_at(at(20))).unwrap();

        let batch = queue.dequeue_batch(10).unwrap();
        let ids: Vec<_> = batch.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);

        let capped = queue.dequeue_batch(2).unwrap();
        assert_eq!(capped.len(), 2);
        assert!(queue.dequeue_batch(0).unwrap().is_empty());
    }

    #[test]
    fn test_dequeue_excluding() {
        let queue = create_test_queue();

        queue.enqueue(item("a", "f1", "{}").with_enqueued_at(at(1))).unwrap();
        queue.enqueue(item("b", "f2", "{}").with_enqueued_at(at(2))).unwrap();
        queue.enqueue(item("c", "f3", "{}").with_enqueued_at(at(3))).unwrap();

        let exclude: HashSet<String> = ["a".to_string()].into_iter().collect();
        let batch = queue.dequeue_batch_excluding(2, &exclude).unwrap();
        let ids: Vec<_> = batch.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_record_failure_keeps_item() {
        let queue = create_test_queue();
        queue.enqueue(item("q1", "f1", "{}")).unwrap();

        assert!(queue.record_failure("q1", "Connection error").unwrap());

        let loaded = queue.get("q1").unwrap().unwrap();
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.last_error.as_deref(), Some("Connection error"));
        assert!(loaded.last_attempt_at.is_some());
        assert_eq!(queue.latest_error().unwrap().as_deref(), Some("Connection error"));

        assert!(!queue.record_failure("missing", "x").unwrap());
    }

    #[test]
    fn test_dead_letter_and_requeue() {
        let queue = create_test_queue();
        queue.enqueue(item("q1", "f1", "{}")).unwrap();
        queue.record_failure("q1", "rejected").unwrap();

        queue.mark_dead_letter("q1").unwrap();
        assert!(queue.dequeue_batch(10).unwrap().is_empty());
        assert_eq!(queue.dead_letters().unwrap().len(), 1);
        assert_eq!(queue.open_count().unwrap(), 1);

        queue.requeue("q1").unwrap();
        let loaded = queue.get("q1").unwrap().unwrap();
        assert!(!loaded.dead_letter);
        assert_eq!(loaded.retry_count, 0);
        assert_eq!(queue.dequeue_batch(10).unwrap().len(), 1);

        assert!(matches!(queue.requeue("nope"), Err(FieldSyncError::NotFound(_))));
    }

    #[test]
    fn test_edit_to_dead_letter_stays_listed() {
        let queue = create_test_queue();
        queue.enqueue(item("q1", "f1", "v1").with_enqueued_at(at(0))).unwrap();
        queue.record_failure("q1", "rejected").unwrap();
        queue.mark_dead_letter("q1").unwrap();

        let mut edit = item("q2", "f1", "v2").with_enqueued_at(at(10));
        edit.action = SyncAction::Update;
        let merged = queue.enqueue(edit).unwrap();

        assert!(merged.dead_letter);
        assert!(queue.dequeue_batch(10).unwrap().is_empty());

        let dead = queue.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, "q1");
        assert_eq!(dead[0].payload, b"v2");
        assert_eq!(dead[0].revision, 1);

        // Requeueing sends the newest payload
        queue.requeue("q1").unwrap();
        assert_eq!(queue.dequeue_batch(10).unwrap()[0].payload, b"v2");
    }

    #[test]
    fn test_stats() {
        let queue = create_test_queue();

        queue.enqueue(item("a", "f1", "{}").with_enqueued_at(at(5))).unwrap();
        queue.enqueue(item("b", "f2", "{}").with_enqueued_at(at(1))).unwrap();
        queue.record_failure("a", "boom").unwrap();
        queue.mark_dead_letter("b").unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.open, 2);
        assert_eq!(stats.failing, 1);
        assert_eq!(stats.dead_letters, 1);
        assert_eq!(stats.oldest_enqueued_at, Some(at(1)));
    }

    #[test]
    fn test_remove_if_revision() {
        let queue = create_test_queue();
        queue.enqueue(item("q1", "f1", "v1")).unwrap();
        queue.enqueue(item("q9", "f1", "v2")).unwrap();

        let stale = queue
            .db
            .with_conn(|conn| remove_if_revision(conn, "q1", 0))
            .unwrap();
        assert!(!stale);

        let current = queue
            .db
            .with_conn(|conn| remove_if_revision(conn, "q1", 1))
            .unwrap();
        assert!(current);
        assert_eq!(queue.open_count().unwrap(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let queue = create_test_queue();
        queue.enqueue(item("a", "f1", "{}")).unwrap();
        queue.enqueue(item("b", "f2", "{}")).unwrap();

        assert!(queue.remove("a").unwrap());
        assert!(!queue.remove("a").unwrap());
        assert_eq!(queue.clear().unwrap(), 1);
        assert_eq!(queue.open_count().unwrap(), 0);
    }
}
