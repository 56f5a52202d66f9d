//! Virtindex Server
//!
//! Run with: cargo run --bin virtindex -- --config config.toml
//!
//! # Configuration
//!
//! Settings come from the config file (or the default locations), then
//! `VIRTINDEX_*` environment variables, then command-line flags.
//! `RUST_LOG` overrides the configured log level.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use virtindex::api::{serve, AppState};
use virtindex::config::{Config, LoggingConfig};
use virtindex::database::Database;

#[derive(Parser)]
#[command(name = "virtindex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tag to metric-name query engine")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging);

    tracing::info!("Starting Virtindex v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        custom = %config.index.custom_service,
        text = %config.index.text_service,
        interval_ms = config.index.materialize_interval_ms,
        "Index settings"
    );

    let db = Arc::new(Database::new(config.index.clone())?);

    // Start background materialization
    let materialize_handle =
        db.start_background_materialize(config.index.materialize_interval());

    let state = AppState::new(Arc::clone(&db), config.api.clone());
    serve(state, &config.api).await?;

    // Graceful shutdown
    tracing::info!("Publishing pending writes...");
    db.shutdown();
    if let Err(e) = materialize_handle.await {
        tracing::warn!("Materialization task ended abnormally: {}", e);
    }

    tracing::info!("Virtindex stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("virtindex={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
