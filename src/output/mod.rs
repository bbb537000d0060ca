//! Output formatting for fieldsync.
//!
//! This module provides formatters for displaying queue, status and record
//! data in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::FieldSyncError;
use crate::records::EntityKind;
use crate::sync::{DrainReport, QueueStats, StatusSnapshot, SyncQueueItem};

pub use json::*;
pub use pretty::*;

/// Format queue items based on output format
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_queue_items(
    items: &[SyncQueueItem],
    title: &str,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_queue_items_pretty(items, title)),
        OutputFormat::Json => format_queue_items_json(items, title),
    }
}

/// Format the sync status based on output format
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_status(
    snapshot: &StatusSnapshot,
    stats: &QueueStats,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(snapshot, stats)),
        OutputFormat::Json => format_status_json(snapshot, stats),
    }
}

/// Format a drain report based on output format
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_drain_report(report: &DrainReport, format: OutputFormat) -> Result<String, FieldSyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_report_pretty(report)),
        OutputFormat::Json => format_drain_report_json(report),
    }
}

/// Format stored records based on output format
///
/// # Errors
///
/// Returns `FieldSyncError::Parse` if JSON serialization fails.
pub fn format_records(
    kind: EntityKind,
    records: &[serde_json::Value],
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_records_pretty(kind, records)),
        OutputFormat::Json => format_records_json(kind, records),
    }
}
