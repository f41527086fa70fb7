//! Keepsake API Server
//!
//! Run with: cargo run --bin keepsake-api
//!
//! # Configuration
//!
//! Reads `--config <file>` or the default config locations, then applies
//! environment overrides:
//! - `KEEPSAKE_DATABASE`: SQLite database file
//! - `KEEPSAKE_API_HOST`: Host to bind to (default: 0.0.0.0)
//! - `KEEPSAKE_API_PORT`: Port to listen on (default: 8090)
//! - `KEEPSAKE_ACCESS_KEY`: Key every `/api/v1` request must carry
//! - `KEEPSAKE_LOG_LEVEL` / `KEEPSAKE_LOG_FORMAT`: Logging
//! - `RUST_LOG`: Log filter (overrides the level)

use clap::Parser;
use keepsake::api::{serve, AppState};
use keepsake::config::Config;
use keepsake::storage::SqliteStore;
use keepsake::telemetry::init_logging;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "keepsake-api")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hosted backend for the Keepsake journal")]
struct Args {
    /// Config file (default: search the usual locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    init_logging(&config.logging);

    tracing::info!("Starting Keepsake API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {}", config.storage.database_path);

    if config.api.access_key.is_none() {
        tracing::warn!("No access key configured; the API is open to anyone who can reach it");
    }

    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);

    let state = AppState::new(Arc::clone(&store), config.api.clone());
    let forwarder = state.start_realtime();

    tracing::info!("Starting server on {}", config.api.addr());
    serve(state, &config.api).await?;

    forwarder.abort();
    tracing::info!("Keepsake API server stopped");

    Ok(())
}
