//! formdesk: operator tool for the forms portal storage.
//!
//! `check` connects, migrates, and validates the file storage round-trip.
//! `orphans` reports blobs that no record references, optionally deleting them.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formdesk_core::defaults;
use formdesk_db::{redact_url, Database, FilesystemBackend, PoolConfig, PoolHealth};
use formdesk_portal::{Portal, PortalConfig};

#[derive(Parser)]
#[command(name = "formdesk")]
#[command(author, version, about = "Operator tool for the formdesk portal")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/formdesk")]
    database_url: String,

    /// Root directory for blob bytes
    #[arg(long, env = "FILE_STORAGE_PATH", default_value = defaults::FILE_STORAGE_PATH)]
    storage_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, run migrations and validate file storage
    Check,

    /// List blobs that no record references
    Orphans {
        /// Delete the orphans instead of only listing them
        #[arg(long)]
        purge: bool,

        /// Only consider blobs at least this many hours old
        #[arg(long, default_value_t = defaults::ORPHAN_MIN_AGE_HOURS)]
        min_age_hours: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _file_guard = init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "formdesk failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let backend = FilesystemBackend::new(&cli.storage_path);
    let db = Database::connect_with_config(&cli.database_url, PoolConfig::from_env(), backend)
        .await?;
    db.migrate().await?;

    match cli.command {
        Commands::Check => {
            let health = PoolHealth::of(db.pool());
            health.log();
            info!(
                database = %redact_url(&cli.database_url),
                storage_path = %cli.storage_path,
                "Database and file storage ready"
            );
            println!(
                "ok: pool {} open / {} idle, storage {}",
                health.size, health.idle, cli.storage_path
            );
        }
        Commands::Orphans {
            purge,
            min_age_hours,
        } => {
            let portal = Portal::new(
                db.blobs.clone(),
                db.records.clone(),
                PortalConfig::from_env(),
            );
            let min_age = chrono::Duration::hours(min_age_hours.max(0));

            if purge {
                let report = portal.purge_orphaned_blobs(min_age).await?;
                println!(
                    "deleted {} orphan(s), {} already missing, {} failed",
                    report.deleted.len(),
                    report.already_missing.len(),
                    report.failed.len()
                );
                for (id, cause) in &report.failed {
                    println!("  failed {}: {}", id, cause);
                }
                if !report.is_clean() {
                    anyhow::bail!("{} orphan(s) could not be deleted", report.failed.len());
                }
            } else {
                let orphans = portal.find_orphaned_blobs(min_age).await?;
                for blob in &orphans {
                    println!(
                        "{}\t{}\t{}\t{}",
                        blob.id,
                        blob.created_at.to_rfc3339(),
                        blob.size_bytes,
                        blob.original_name
                    );
                }
                println!("{} orphan(s)", orphans.len());
            }
        }
    }
    Ok(())
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "formdesk=info")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "formdesk=info,formdesk_portal=info,formdesk_db=info".into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("formdesk.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}
