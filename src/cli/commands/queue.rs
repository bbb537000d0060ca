//! Sync queue command implementation.
//!
//! Handles queue inspection and operator commands.

use crate::cli::args::{OutputFormat, QueueCommands};
use crate::error::FieldSyncError;
use crate::output::{format_queue_items, to_json};
use crate::sync::SyncQueue;

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or updated.
pub fn queue(
    queue: &SyncQueue,
    cmd: QueueCommands,
    format: OutputFormat,
) -> Result<String, FieldSyncError> {
    match cmd {
        QueueCommands::List { limit } => {
            let items: Vec<_> = queue.list_all()?.into_iter().take(limit).collect();
            format_queue_items(&items, "Sync Queue", format)
        },
        QueueCommands::DeadLetters => format_queue_items(&queue.dead_letters()?, "Dead Letters", format),
        QueueCommands::Retry { id } => retry_item(queue, &id, format),
        QueueCommands::Clear { force } => clear_queue(queue, force, format),
    }
}

/// Requeue a dead-lettered item.
fn retry_item(queue: &SyncQueue, id: &str, format: OutputFormat) -> Result<String, FieldSyncError> {
    queue.requeue(id)?;
    let item = queue
        .get(id)?
        .ok_or_else(|| FieldSyncError::NotFound(format!("Queue item {id}")))?;

    match format {
        OutputFormat::Json => to_json(&item),
        OutputFormat::Pretty => Ok(format!(
            "Requeued {} {} ({} {})",
            item.entity_type.display_name(),
            item.record_id,
            item.action,
            item.id
        )),
    }
}

/// Drop every queued item.
fn clear_queue(queue: &SyncQueue, force: bool, format: OutputFormat) -> Result<String, FieldSyncError> {
    if !force {
        return Err(FieldSyncError::Config(
            "Use --force to clear the queue; unsynced changes will never reach the server".to_string(),
        ));
    }
    let count = queue.clear()?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({"cleared": count})),
        OutputFormat::Pretty => Ok(format!("Cleared {count} items from the queue")),
    }
}
