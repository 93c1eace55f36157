// ABOUTME: CLI entry point for cron-replicator
// ABOUTME: Parses commands, loads configuration and routes to the command handlers

use clap::{Parser, Subcommand};
use cron_replicator::commands::{self, AppContext};
use cron_replicator::config::{AppConfig, ConfigOverrides, Mode, SourceKind};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cron-replicator")]
#[command(about = "Scheduled table replication to a remote ingestion API", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the TOML configuration file (defaults to ./replicator.toml when present)
    #[arg(long, env = "REPLICATOR_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Runtime mode; development uses small batches
    #[arg(long, env = "REPLICATOR_MODE", global = true, value_enum)]
    mode: Option<Mode>,
    /// Directory for the schedule, audit log and saved filters
    #[arg(long = "data-dir", env = "REPLICATOR_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// Source PostgreSQL connection string
    #[arg(long = "source-url", env = "SOURCE_DATABASE_URL", global = true)]
    source_url: Option<String>,
    /// Read tables from a JSON fixture file instead of a database
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,
    /// Base URL of the ingestion API
    #[arg(long = "ingest-url", env = "INGEST_BASE_URL", global = true)]
    ingest_url: Option<String>,
    /// API key sent with every batch (falls back to INGEST_API_KEY env)
    #[arg(long = "api-key", env = "INGEST_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,
    /// Rows per batch in production mode
    #[arg(long = "batch-size", env = "SYNC_BATCH_SIZE", global = true)]
    batch_size: Option<usize>,
    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List databases on the source
    Databases,
    /// List tables in a source database
    Tables {
        #[arg(long)]
        db: String,
    },
    /// Show the first rows of a source table
    Preview {
        #[arg(long)]
        db: String,
        #[arg(long)]
        table: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Replicate one table now, prompting for missing names
    Sync {
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        table: Option<String>,
        /// Ignore the filters saved for the table
        #[arg(long)]
        no_filters: bool,
    },
    /// Manage the recurring schedule
    Schedule(commands::schedule::ScheduleArgs),
    /// Show recent sync outcomes
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage saved row filters
    Filters(commands::filters::FiltersArgs),
    /// Run the scheduler in the foreground until Ctrl+C
    Run {
        /// Seconds between checks for schedule changes made by other commands
        #[arg(long, default_value_t = 30)]
        reload_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        mode: cli.mode,
        data_dir: cli.data_dir,
        source_kind: cli.fixture.as_ref().map(|_| SourceKind::Fixture),
        source_url: cli.source_url,
        fixture_path: cli.fixture,
        ingest_base_url: cli.ingest_url,
        ingest_api_key: cli.api_key,
        batch_size: cli.batch_size,
    });

    let ctx = AppContext::new(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Databases => commands::browse::databases(&ctx, json).await,
        Commands::Tables { db } => commands::browse::tables(&ctx, &db, json).await,
        Commands::Preview { db, table, limit } => {
            commands::browse::preview(&ctx, &db, &table, limit, json).await
        }
        Commands::Sync {
            db,
            table,
            no_filters,
        } => {
            commands::sync::sync(
                &ctx,
                commands::sync::SyncOptions {
                    db_name: db,
                    table_name: table,
                    no_filters,
                },
            )
            .await
        }
        Commands::Schedule(args) => commands::schedule::command(&ctx, args).await,
        Commands::Logs { limit } => commands::logs::command(&ctx, limit, json).await,
        Commands::Filters(args) => commands::filters::command(&ctx, args).await,
        Commands::Run { reload_secs } => {
            commands::run::command(&ctx, Duration::from_secs(reload_secs.max(1))).await
        }
    }
}
