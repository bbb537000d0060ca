//! JSON output formatting for fieldsync.
//!
//! This module provides functions for formatting queue and record data as JSON.

use serde::Serialize;
use serde_json::json;

use crate::error::FieldSyncError;
use crate::records::EntityKind;
use crate::sync::{DrainReport, QueueStats, StatusSnapshot, SyncQueueItem};

/// Format queue items as JSON
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_queue_items_json(items: &[SyncQueueItem], title: &str) -> Result<String, FieldSyncError> {
    let output = json!({
        "list": title,
        "count": items.len(),
        "items": items
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a status snapshot and queue statistics as JSON
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_status_json(snapshot: &StatusSnapshot, stats: &QueueStats) -> Result<String, FieldSyncError> {
    let output = json!({
        "status": snapshot.status,
        "network": snapshot.network,
        "pending": snapshot.pending,
        "failing": stats.failing,
        "dead_letters": snapshot.dead_letters,
        "last_error": snapshot.last_error,
        "oldest_pending": stats.oldest_enqueued_at.map(|t| t.to_rfc3339()),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a drain report as JSON
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_drain_report_json(report: &DrainReport) -> Result<String, FieldSyncError> {
    let output = json!({
        "outcome": report.outcome.as_str(),
        "applied": report.applied,
        "failed": report.failed,
        "skipped": report.skipped,
        "superseded": report.superseded,
        "abandoned": report.abandoned,
        "storage_error": report.storage_error,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format stored records as JSON
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_records_json(kind: EntityKind, records: &[serde_json::Value]) -> Result<String, FieldSyncError> {
    let output = json!({
        "collection": kind.table(),
        "count": records.len(),
        "items": records
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, FieldSyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
