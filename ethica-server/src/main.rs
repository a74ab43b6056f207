//! ethica-server - learning progress tracking service
//!
//! Resolves configuration (CLI, environment, TOML file, defaults), opens the
//! SQLite database and serves the HTTP API until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ethica_common::config::{load_toml_config, CliOverrides, ServiceConfig};
use ethica_common::db::init_database;
use ethica_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "ethica_server=info,ethica_common=info,tower_http=info";

/// Command-line arguments for ethica-server
#[derive(Parser, Debug)]
#[command(name = "ethica-server")]
#[command(about = "Learning progress tracking and analytics service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "ETHICA_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "ETHICA_BIND")]
    bind: Option<String>,

    /// Folder holding ethica.db
    #[arg(short, long, env = "ETHICA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "ETHICA_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive (e.g. "debug" or "ethica_common=trace")
    #[arg(short, long, env = "ETHICA_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration file")?;
    let config = ServiceConfig::resolve(
        CliOverrides {
            root_folder: args.root_folder,
            bind: args.bind,
            port: args.port,
            log_level: args.log_level,
        },
        toml_config,
    );

    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .log_level
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER)
            .into()
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting ethica-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database path: {}", config.db_path.display());

    let pool = init_database(&config.db_path, &config.database)
        .await
        .context("Failed to initialize database")?;

    let state = AppState::with_sqlite(
        pool.clone(),
        config.auth.token_ttl_hours,
        config.database.max_lock_wait_ms,
    )
    .await
    .context("Failed to initialize identity store")?;

    if config.cors_permissive {
        info!("Permissive CORS enabled");
    }
    let app = build_router(state, config.cors_permissive);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ethica-server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
