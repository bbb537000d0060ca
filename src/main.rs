use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fieldsync::cli::args::{Cli, Commands};
use fieldsync::cli::commands;
use fieldsync::config::{Config, Paths};
use fieldsync::storage::LocalStore;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let paths = Paths::new()?;
    let config = Config::load_from_path(&paths.config_file)?;
    init_tracing(&config.logging.level);

    let db_path = match cli.db {
        Some(path) => path,
        None => {
            paths.ensure_dirs()?;
            paths.database.clone()
        },
    };
    let store = LocalStore::open_at(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    let format = cli.output;

    let output = match cli.command {
        Commands::Status { watch: false } => commands::status(&store, &config, format)?,
        Commands::Status { watch: true } => commands::watch_status(&store, &config, format).await?,
        Commands::Queue(args) => commands::queue(&store.queue(), args.command, format)?,
        Commands::Record { kind, file } => commands::record(&store, kind, &file, format)?,
        Commands::Delete { kind, id } => commands::delete(&store, kind, &id, format)?,
        Commands::Drain { endpoint, offline } => {
            commands::drain(&store, &config, endpoint, offline, format).await?
        },
        Commands::Records { kind, index, value } => {
            commands::records(&store, kind, index.as_deref(), value.as_deref(), format)?
        },
    };

    store.close()?;

    if !output.is_empty() {
        println!("{output}");
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fieldsync={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
