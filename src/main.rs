//! NTP server pool manager.
//!
//! # Architecture Overview
//!
//! ```text
//!     config file ──▶ config::loader ──▶ lifecycle::startup ──▶ PoolManager
//!          │                                                      │   ▲
//!          ▼                                                      │   │
//!     config::watcher ──▶ apply_reload ───────────────────────────┘   │
//!                                                                     │
//!     health::monitor (one task per pool) ── check_health ────────────┤
//!                                         ── attempt_recovery ────────┘
//!                                                  │
//!                                                  ▼
//!                          health::checker ──▶ probe::sntp ──▶ NTP servers
//!
//!     observability: tracing logs, Prometheus metrics
//!     lifecycle: SIGINT/SIGTERM ──▶ Shutdown broadcast ──▶ monitors stop
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::time;

use ntp_pool::config::{load_config, ConfigWatcher, NtpPoolConfig};
use ntp_pool::health::monitor;
use ntp_pool::lifecycle::{signals, startup, Shutdown};
use ntp_pool::observability;
use ntp_pool::pool::PoolManager;
use ntp_pool::probe::{SntpProbe, TimeProbe};

/// How long monitors get to stop after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "ntp-pool")]
#[command(about = "Health-checked, load-balanced pools of NTP servers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "ntp-pool.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool daemon (default)
    Run,
    /// Check every pool once and print health reports and statistics as JSON
    Check {
        /// Only check this pool
        #[arg(short, long)]
        pool: Option<String>,
    },
    /// Check a pool once, then print the servers it would hand out
    Select {
        #[arg(short, long)]
        pool: String,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(cli.config, config).await,
        Commands::Check { pool } => {
            let manager = one_shot_manager(&config)?;
            check(&manager, pool.as_deref()).await
        }
        Commands::Select { pool, count } => {
            let manager = one_shot_manager(&config)?;
            select(&manager, &pool, count).await
        }
    }
}

async fn run(path: PathBuf, config: NtpPoolConfig) -> Result<(), BoxError> {
    observability::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?path, "ntp-pool starting");

    let probe: Arc<dyn TimeProbe> = Arc::new(SntpProbe::new());
    let manager = Arc::new(startup::build_manager(&config, probe)?);
    let shutdown = Shutdown::new();

    let monitors = monitor::spawn_all(&manager, &config.health_check, &shutdown);

    let (watcher, updates) = ConfigWatcher::new(&path);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    let reload = tokio::spawn(startup::run_reload_loop(
        Arc::clone(&manager),
        updates,
        shutdown.subscribe(),
    ));

    signals::wait_for_shutdown_signal().await;
    tracing::info!("Initiating graceful shutdown");
    shutdown.trigger();

    let drain = async {
        for handle in monitors {
            let _ = handle.await;
        }
        let _ = reload.await;
    };
    if time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(grace = ?SHUTDOWN_GRACE, "Tasks still running after grace period, exiting");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn one_shot_manager(config: &NtpPoolConfig) -> Result<PoolManager, BoxError> {
    let mut logging_only = config.observability.clone();
    logging_only.metrics_enabled = false;
    observability::init(&logging_only)?;

    let probe: Arc<dyn TimeProbe> = Arc::new(SntpProbe::new());
    Ok(startup::build_manager(config, probe)?)
}

async fn check(manager: &PoolManager, only: Option<&str>) -> Result<(), BoxError> {
    let mut output = Vec::new();

    for summary in manager.list_pools() {
        if only.is_some_and(|name| name != summary.name) {
            continue;
        }
        let report = manager.check_health(summary.id).await?;
        let recovery = if manager.has_failed_servers(summary.id)? {
            Some(manager.attempt_recovery(summary.id).await?)
        } else {
            None
        };
        let statistics = manager.get_statistics(summary.id)?;
        output.push(json!({
            "health": report,
            "recovery": recovery,
            "statistics": statistics,
        }));
    }

    if let Some(name) = only {
        if output.is_empty() {
            return Err(format!("no pool named '{}'", name).into());
        }
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn select(manager: &PoolManager, pool: &str, count: usize) -> Result<(), BoxError> {
    let pool_id = manager
        .find_pool(pool)
        .ok_or_else(|| format!("no pool named '{}'", pool))?;
    manager.check_health(pool_id).await?;

    let mut picks = Vec::with_capacity(count);
    for _ in 0..count {
        picks.push(manager.get_next_server(pool_id)?);
    }

    println!("{}", serde_json::to_string_pretty(&picks)?);
    Ok(())
}
