//! # Jobtrail: scheduled reminder and summary emails
//!
//! Usage:
//!   jobtrail serve                       # HTTP trigger + diagnostics (default port 3000)
//!   jobtrail serve --port 8080
//!   jobtrail dispatch                    # One scheduled invocation at the current minute
//!   jobtrail dispatch --at 09:00         # ...as if the reference clock read 09:00 today
//!   jobtrail dispatch --manual ana@example.com
//!   jobtrail diagnose ana@example.com    # Why didn't I get an email?
//!   jobtrail init-db                     # Create the SQLite schema

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use jobtrail_channels::DeliveryAdapter;
use jobtrail_core::config::{StoreBackend, StoreConfig};
use jobtrail_core::{JobtrailConfig, RecipientStore};
use jobtrail_scheduler::{Dispatcher, JsonStore, ReferenceClock, SqliteStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "jobtrail",
    version,
    about = "📬 Jobtrail: per-recipient scheduled reminder and summary dispatch"
)]
struct Cli {
    /// Config file (default: $JOBTRAIL_CONFIG or ~/.jobtrail/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one invocation and print its report
    Dispatch {
        /// Force both messages for one recipient (id or email)
        #[arg(long, value_name = "USER")]
        manual: Option<String>,

        /// Pretend the reference clock reads HH:MM today
        #[arg(long, value_name = "HH:MM")]
        at: Option<String>,
    },

    /// Report dispatch preconditions for one recipient without sending
    Diagnose {
        /// Recipient id or email
        user: String,

        #[arg(long, value_name = "HH:MM")]
        at: Option<String>,
    },

    /// Create the SQLite schema and exit
    InitDb,
}

fn load_config(path: Option<&PathBuf>) -> Result<JobtrailConfig> {
    let config = match path {
        Some(p) => {
            let expanded = PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).to_string());
            JobtrailConfig::load_from(&expanded)
                .with_context(|| format!("loading {}", expanded.display()))?
        }
        None => JobtrailConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecipientStore>> {
    let path = config.resolved_path();
    let store: Arc<dyn RecipientStore> = match config.backend {
        StoreBackend::Sqlite => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let db = SqliteStore::open(&path)?;
            tracing::info!("💾 SQLite store: {}", path.display());
            Arc::new(db)
        }
        StoreBackend::Json => Arc::new(
            JsonStore::open(&path).with_context(|| format!("opening {}", path.display()))?,
        ),
    };
    Ok(store)
}

/// The instant to evaluate at: now, or today at `--at` on the reference clock.
fn resolve_now(clock: &ReferenceClock, at: Option<&str>) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    match at {
        None => Ok(now),
        Some(hhmm) => clock
            .today_at(now, hhmm)
            .with_context(|| format!("--at expects HH:MM, got '{hhmm}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "jobtrail=debug,tower_http=debug"
    } else {
        "jobtrail=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = load_config(cli.config.as_ref())?;

    if let Commands::InitDb = cli.command {
        if config.store.backend != StoreBackend::Sqlite {
            anyhow::bail!("init-db only applies to the sqlite store backend");
        }
        open_store(&config.store)?;
        println!("✅ Schema ready at {}", config.store.resolved_path().display());
        return Ok(());
    }

    let store = open_store(&config.store)?;
    let delivery = DeliveryAdapter::from_config(&config.email);
    let dispatcher = Dispatcher::new(store, delivery, &config)?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let state = jobtrail_gateway::AppState::new(config, Arc::new(dispatcher));
            jobtrail_gateway::start(state).await?;
        }
        Commands::Dispatch { manual, at } => {
            let now = resolve_now(dispatcher.clock(), at.as_deref())?;
            let report = match manual {
                Some(user) => dispatcher.run_manual(&user, now).await?,
                None => dispatcher.run_invocation(now).await?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Diagnose { user, at } => {
            let now = resolve_now(dispatcher.clock(), at.as_deref())?;
            let report = dispatcher.diagnose(&user, now).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                eprintln!("⚠️  {} issue(s) found", report.issues.len());
            }
        }
        Commands::InitDb => {}
    }
    Ok(())
}
