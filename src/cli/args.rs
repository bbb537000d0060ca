use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::records::EntityKind;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Offline-first record store and sync queue for field operations")]
#[command(long_about = "fieldsync - offline-first store and sync engine

Captures trips, fuel entries, camera reports, handovers and photos into a
local database, queues every change, and pushes the queue to the sync
endpoint once the network is back.

QUICK START:
  fieldsync record fuel entry.json     Store a record and queue it
  fieldsync status                     Show pending changes
  fieldsync drain                      Push the queue to the endpoint
  fieldsync queue dead-letters         Show items that gave up

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Database file to use instead of ~/.fieldsync/fieldsync.db
    #[arg(long, global = true, env = "FIELDSYNC_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync status
    ///
    /// Reports network state, the number of pending changes, dead letters
    /// and the most recent remote error.
    ///
    /// # Examples
    ///
    ///   fieldsync status
    ///   fieldsync status -o json
    ///   fieldsync status --watch
    #[command(alias = "st")]
    Status {
        /// Keep running and print every status change
        #[arg(long, short)]
        watch: bool,
    },

    /// Inspect and manage the sync queue
    ///
    /// # Subcommands
    ///
    ///   list          Show all open items, oldest first
    ///   dead-letters  Show items the retry policy gave up on
    ///   retry         Put a dead-lettered item back in line
    ///   clear         Drop every queued item (requires --force)
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Store a record from a JSON file and queue it for sync
    ///
    /// The record is created if its ID is new and updated otherwise. The
    /// write and the queue entry are committed together.
    ///
    /// # Examples
    ///
    ///   fieldsync record fuel fill-up.json
    ///   fieldsync record trip trip-42.json
    Record {
        /// Record kind (trip, fuel, report, handover, photo)
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,

        /// JSON file holding the record
        file: PathBuf,
    },

    /// Queue a record for deletion on the server
    ///
    /// The local copy is removed once the endpoint acknowledges the delete.
    Delete {
        /// Record kind (trip, fuel, report, handover, photo)
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,

        /// Record ID
        id: String,
    },

    /// Push queued changes to the sync endpoint
    ///
    /// Items that fail stay queued with their error recorded; the rest of
    /// the queue still goes through.
    ///
    /// # Examples
    ///
    ///   fieldsync drain
    ///   fieldsync drain --endpoint https://sync.example.com
    Drain {
        /// Endpoint base URL (overrides remote.endpoint in config.yaml)
        #[arg(long)]
        endpoint: Option<String>,

        /// Treat the network as offline (nothing is sent)
        #[arg(long)]
        offline: bool,
    },

    /// List stored records of one kind
    ///
    /// # Examples
    ///
    ///   fieldsync records trip
    ///   fieldsync records trip --index by_vehicle --value van-7
    ///   fieldsync records fuel --index by_sync --value false
    Records {
        /// Record kind (trip, fuel, report, handover, photo)
        #[arg(value_parser = parse_kind)]
        kind: EntityKind,

        /// Declared index to filter by
        #[arg(long, requires = "value")]
        index: Option<String>,

        /// Value the index must equal
        #[arg(long, requires = "index")]
        value: Option<String>,
    },
}

/// Arguments for the queue command.
#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// List open items, oldest first
    List {
        /// Maximum items to show
        #[arg(long, short = 'n', default_value = "50")]
        limit: usize,
    },

    /// List dead-lettered items
    DeadLetters,

    /// Requeue a dead-lettered item with a clean failure history
    Retry {
        /// Queue item ID
        id: String,
    },

    /// Remove every queued item
    Clear {
        /// Required; unsynced changes are lost
        #[arg(long)]
        force: bool,
    },
}

fn parse_kind(s: &str) -> Result<EntityKind, String> {
    EntityKind::parse(s)
        .ok_or_else(|| format!("unknown record kind '{s}' (expected trip, fuel, report, handover or photo)"))
}
