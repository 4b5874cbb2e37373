use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syndic::config::Config;
use syndic::models::Severity;

mod commands;

use commands::AppContext;

#[derive(Parser)]
#[command(
    name = "syndic",
    version,
    about = "Polls WordPress sources and imports, paraphrases and re-hosts their posts",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single cycle over all eligible sources
    Run,

    /// Keep running cycles until interrupted
    Daemon {
        /// Serve /metrics and /health on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// Manage sources
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Skip cycles until resumed
    Pause,

    /// Allow cycles again
    Resume,

    /// Clear the pause flag and run as soon as possible
    ForceRun,

    /// Remove the run lock regardless of owner
    Unlock,

    /// Show scheduler state and source statistics
    Status,

    /// Inspect or trim the activity log
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// Operate on imported posts
    Post {
        #[command(subcommand)]
        action: PostAction,
    },

    /// Manage remote-to-local category mappings
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Manage local categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
}

#[derive(Subcommand)]
enum SourceAction {
    /// Register a source (site URL or posts endpoint)
    Add {
        url: String,

        /// Only import posts published after this date (YYYY-MM-DD); defaults to today
        #[arg(short, long)]
        start_date: Option<NaiveDate>,

        /// Local post type for imported records
        #[arg(short, long, default_value = "post")]
        post_type: String,

        /// Skip the reachability check
        #[arg(long)]
        no_verify: bool,
    },

    /// List registered sources
    List,

    /// Remove a source
    Delete { url: String },

    /// Start a source over from page 1
    Reset { url: String },
}

#[derive(Subcommand)]
enum LogsAction {
    /// Show recent entries, newest first
    List {
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Only this severity (info, warning, error)
        #[arg(short, long)]
        severity: Option<Severity>,

        /// Only entries for this source URL
        #[arg(long)]
        source: Option<String>,
    },

    /// Delete entries older than the retention period
    Prune {
        /// Retention in days; defaults to logging.retention_days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Delete every entry
    Clear,
}

#[derive(Subcommand)]
enum PostAction {
    /// Put the original title, content and excerpt back
    Restore { post_id: i64 },

    /// Paraphrase the original text again
    Reparaphrase { post_id: i64 },
}

#[derive(Subcommand)]
enum MappingAction {
    /// List mappings
    List,

    /// Map a remote category name onto a local category id
    Set { remote_name: String, category_id: i64 },

    /// Remove a mapping
    Remove { remote_name: String },

    /// Attach newly mapped categories to already imported posts
    Remap,

    /// Show remote categories seen in imported posts and whether they are mapped
    Discover,

    /// Create and map a local category for every unmapped remote category
    CreateMissing,
}

#[derive(Subcommand)]
enum CategoryAction {
    /// Create a local category
    Add { name: String },

    /// List local categories
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::debug!("syndic starting");

    let ctx = AppContext::build(config).await?;

    match cli.command {
        Commands::Run => commands::run_once(ctx).await?,

        Commands::Daemon { metrics_addr } => {
            tracing::info!(metrics_addr = ?metrics_addr, "Starting daemon");
            commands::daemon(ctx, metrics_addr).await?;
        }

        Commands::Source { action } => match action {
            SourceAction::Add {
                url,
                start_date,
                post_type,
                no_verify,
            } => {
                tracing::info!(
                    url = %url,
                    start_date = ?start_date,
                    post_type = %post_type,
                    verify = !no_verify,
                    "Adding source"
                );
                commands::sources::add(&ctx, &url, start_date, &post_type, !no_verify).await?;
            }
            SourceAction::List => commands::sources::list(&ctx)?,
            SourceAction::Delete { url } => commands::sources::delete(&ctx, &url)?,
            SourceAction::Reset { url } => commands::sources::reset(&ctx, &url)?,
        },

        Commands::Pause => commands::control::pause(&ctx).await?,
        Commands::Resume => commands::control::resume(&ctx).await?,
        Commands::ForceRun => commands::control::force_run(&ctx).await?,
        Commands::Unlock => commands::control::unlock(&ctx).await?,
        Commands::Status => commands::control::status(&ctx).await?,

        Commands::Logs { action } => match action {
            LogsAction::List {
                limit,
                severity,
                source,
            } => commands::logs::list(&ctx, limit, severity, source.as_deref())?,
            LogsAction::Prune { days } => commands::logs::prune(&ctx, days)?,
            LogsAction::Clear => commands::logs::clear(&ctx)?,
        },

        Commands::Post { action } => match action {
            PostAction::Restore { post_id } => commands::posts::restore(&ctx, post_id)?,
            PostAction::Reparaphrase { post_id } => {
                commands::posts::reparaphrase(&ctx, post_id).await?
            }
        },

        Commands::Mapping { action } => match action {
            MappingAction::List => commands::mappings::list(&ctx)?,
            MappingAction::Set {
                remote_name,
                category_id,
            } => commands::mappings::set(&ctx, &remote_name, category_id)?,
            MappingAction::Remove { remote_name } => {
                commands::mappings::remove(&ctx, &remote_name)?
            }
            MappingAction::Remap => commands::mappings::remap(&ctx)?,
            MappingAction::Discover => commands::mappings::discover(&ctx)?,
            MappingAction::CreateMissing => commands::mappings::create_missing(&ctx)?,
        },

        Commands::Category { action } => match action {
            CategoryAction::Add { name } => commands::mappings::add_category(&ctx, &name)?,
            CategoryAction::List => commands::mappings::list_categories(&ctx)?,
        },
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("syndic=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("syndic={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("syndic=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
