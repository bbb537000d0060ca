//! Record capture, deletion and listing commands.

use std::path::Path;

use crate::cli::args::OutputFormat;
use crate::error::FieldSyncError;
use crate::output::{format_records, to_json};
use crate::records::{CameraReport, Entity, EntityKind, FuelEntry, Handover, Photo, Trip};
use crate::storage::LocalStore;
use crate::sync::{SyncAction, SyncQueueItem};

/// Store a record from a JSON file and queue it.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse as `kind`,
/// or the write fails.
pub fn record(
    store: &LocalStore,
    kind: EntityKind,
    file: &Path,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    let json = std::fs::read_to_string(file)?;

    let item = match kind {
        EntityKind::Trip => capture::<Trip>(store, &json)?,
        EntityKind::Fuel => capture::<FuelEntry>(store, &json)?,
        EntityKind::Report => capture::<CameraReport>(store, &json)?,
        EntityKind::Handover => capture::<Handover>(store, &json)?,
        EntityKind::Photo => capture::<Photo>(store, &json)?,
    };

    format_queued(&item, format)
}

/// Queue a delete for an existing record.
///
/// # Errors
///
/// Returns `NotFound` if the record does not exist.
pub fn delete(
    store: &LocalStore,
    kind: EntityKind,
    id: &str,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    let item = store.record_deletion(kind, id)?;
    format_queued(&item, format)
}

/// List records, optionally filtered by a declared index.
///
/// # Errors
///
/// Returns `UnknownIndex` for an undeclared index, or a storage error.
pub fn records(
    store: &LocalStore,
    kind: EntityKind,
    index: Option<&str>,
    value: Option<&str>,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    let records = store.list_raw(kind, index.zip(value))?;
    format_records(kind, &records, format)
}

fn capture<E: Entity>(store: &LocalStore, json: &str) -> Result<SyncQueueItem, FieldSyncError> {
    let record: E = serde_json::from_str(json)?;
    let action = if store.get::<E>(record.id())?.is_some() {
        SyncAction::Update
    } else {
        SyncAction::Create
    };
    store.record_change(&record, action)
}

fn format_queued(item: &SyncQueueItem, format: OutputFormat) -> Result<String, FieldSyncError> {
    match format {
        OutputFormat::Json => to_json(item),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} for {} {} (item {})",
            item.action,
            item.entity_type.display_name(),
            item.record_id,
            item.id
        )),
    }
}
