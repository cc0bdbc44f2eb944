//! rota-sched - volunteer shift coordination service
//!
//! Serves conflict reports, auto-assignment, kiosk check-in/out and the
//! attendance desk over HTTP.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rota_common::config::RotaConfig;
use rota_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rota_sched::AppState;

/// Command-line arguments for rota-sched
#[derive(Parser, Debug)]
#[command(name = "rota-sched")]
#[command(about = "Volunteer shift coordination service")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "ROTA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:5810
    #[arg(short, long)]
    bind: Option<String>,

    /// Solver endpoint URL
    #[arg(long)]
    solver_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // CLI > environment > file > defaults
    let mut config = RotaConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(solver_url) = args.solver_url {
        config.solver_url = solver_url;
    }

    info!("Starting rota-sched v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());
    info!("Solver: {}", config.solver_url);

    let db_pool = rota_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(256);
    let bind_address = config.bind_address.clone();
    let state = AppState::new(db_pool, event_bus, config).context("Failed to build service state")?;
    let app = rota_sched::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("rota-sched stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
