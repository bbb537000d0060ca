use chrono::Utc;
use colored::Colorize;

use crate::records::{EntityKind, SYNC_COLUMN};
use crate::sync::{DrainOutcome, DrainReport, QueueStats, StatusSnapshot, SyncQueueItem, SyncStatus};

const ERROR_WIDTH: usize = 60;

/// Format queue items as a pretty table
pub fn format_queue_items_pretty(items: &[SyncQueueItem], title: &str) -> String {
    if items.is_empty() {
        return format!("{title} (0 items)\n  Nothing queued");
    }

    let mut lines = vec![format!("{} ({} items)", title.bold(), items.len())];
    lines.push("─".repeat(78));
    lines.push(format!(
        "{:<34} {:<9} {:<7} {:<17} {}",
        "ID", "Entity", "Action", "Enqueued", "Retries"
    ));
    lines.push("─".repeat(78));

    for item in items {
        let retries = match item.retry_count {
            0 => "0".normal(),
            n if item.dead_letter => n.to_string().red().bold(),
            n => n.to_string().yellow(),
        };
        lines.push(format!(
            "{:<34} {:<9} {:<7} {:<17} {}",
            item.id,
            item.entity_type.as_str(),
            item.action.as_str(),
            item.enqueued_at.format("%Y-%m-%d %H:%M"),
            retries
        ));

        if let Some(error) = &item.last_error {
            lines.push(format!("    {}", shorten(error, ERROR_WIDTH).red()));
        }
    }

    lines.join("\n")
}

/// Format the sync status summary
pub fn format_status_pretty(snapshot: &StatusSnapshot, stats: &QueueStats) -> String {
    let status = match snapshot.status {
        SyncStatus::Offline => "offline".red().bold(),
        SyncStatus::Pending(_) => snapshot.status.to_string().yellow().bold(),
        SyncStatus::Synced => "synced".green().bold(),
    };

    let mut lines = vec![format!("{} {status}", "Sync Status:".bold())];
    lines.push("─".repeat(40));
    lines.push(format!("  Network:       {}", snapshot.network));
    lines.push(format!("  Pending:       {}", snapshot.pending));
    lines.push(format!(
        "  Failing:       {} {}",
        stats.failing,
        if stats.failing > 0 { "items retrying".dimmed() } else { "".normal() }
    ));
    lines.push(format!(
        "  Dead letters:  {} {}",
        snapshot.dead_letters,
        if snapshot.dead_letters > 0 { "need attention".red() } else { "".normal() }
    ));

    if let Some(oldest) = stats.oldest_enqueued_at {
        let age = Utc::now().signed_duration_since(oldest);
        let age_str = if age.num_hours() > 0 {
            format!("{} hours ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{} minutes ago", age.num_minutes())
        } else {
            "just now".to_string()
        };
        lines.push(format!("  Oldest:        {}", age_str.dimmed()));
    }

    if let Some(error) = &snapshot.last_error {
        lines.push(format!("  Last error:    {}", shorten(error, ERROR_WIDTH).red()));
    }

    if snapshot.pending > 0 {
        lines.push(String::new());
        lines.push("Run 'fieldsync drain' to push pending changes".dimmed().to_string());
    }

    lines.join("\n")
}

/// Format a drain report
pub fn format_drain_report_pretty(report: &DrainReport) -> String {
    match report.outcome {
        DrainOutcome::Offline => return "Offline; nothing was sent.".yellow().to_string(),
        DrainOutcome::AlreadyRunning => return "A drain is already running.".yellow().to_string(),
        _ => {},
    }
    if report.attempted() == 0 && report.skipped == 0 && report.abandoned == 0 && report.storage_error.is_none() {
        return "No pending changes to sync.".to_string();
    }

    let mut lines = vec![format!("Drain {}: {} changes attempted", report.outcome, report.attempted())];
    lines.push("─".repeat(40));

    if report.applied > 0 {
        lines.push(format!("  {} {}", "✓".green(), format!("{} applied", report.applied).green()));
    }
    if report.failed > 0 {
        lines.push(format!("  {} {}", "✗".red(), format!("{} failed", report.failed).red()));
    }
    if report.skipped > 0 {
        lines.push(format!("  {} {}", "○".yellow(), format!("{} backing off", report.skipped).yellow()));
    }
    if report.superseded > 0 {
        lines.push(format!("  {} {} edited during sync, will resend", "↻".cyan(), report.superseded));
    }
    if report.abandoned > 0 {
        lines.push(format!("  {} {}", "‼".red(), format!("{} moved to dead letters", report.abandoned).red()));
    }
    if report.outcome == DrainOutcome::StoppedOffline {
        lines.push(format!("  {}", "Network went offline; stopped early".yellow()));
    }
    if let Some(error) = &report.storage_error {
        lines.push(String::new());
        lines.push(format!("{} {}", "Storage error:".red().bold(), error));
    }

    lines.join("\n")
}

/// Format stored records, one line each
pub fn format_records_pretty(kind: EntityKind, records: &[serde_json::Value]) -> String {
    let title = format!("{}s", kind.display_name());
    if records.is_empty() {
        return format!("{title} (0 items)\n  No records");
    }

    let mut output = format!("{} ({} items)\n", title.bold(), records.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for record in records {
        let id = record.get("id").and_then(serde_json::Value::as_str).unwrap_or("?");
        let synced = record
            .get("syncedToServer")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let icon = if synced { "[✓]".green() } else { "[ ]".yellow() };

        let mut line = format!("{icon} {}", id.bold());
        for def in kind.indexes().iter().filter(|def| def.column != SYNC_COLUMN) {
            if let Some(value) = record.get(json_field(def.column)).and_then(serde_json::Value::as_str) {
                line.push_str(&format!("  {}", format!("{}={value}", def.name.trim_start_matches("by_")).dimmed()));
            }
        }
        output.push_str(&line);
        output.push('\n');
    }

    output
}

/// camelCase JSON field backing an index column.
fn json_field(column: &str) -> &str {
    match column {
        "vehicle_id" => "vehicleId",
        "trip_id" => "tripId",
        other => other,
    }
}

/// Truncate to `max` characters with an ellipsis.
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}
