//! bskyfeed server
//!
//! A Bluesky feed generator that collects replies to posts its users
//! subscribed to by replying with a marker.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use bskyfeed_core::framework::DatabaseProcessor;
use bskyfeed_core::processors::{EventHandler, FirehoseConsumer, JetstreamSource};
use clap::Parser;
use config::ConfigLoader;
use server::{build_router, run_server};
use shutdown::spawn_shutdown_broadcaster;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// bskyfeed - reply subscription feed generator
#[derive(Parser, Debug)]
#[command(name = "bskyfeed-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "BSKYFEED_CONFIG", default_value = "./bskyfeed.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the directory holding the database
    #[arg(long, env = "BSKYFEED_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting bskyfeed-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(&args.config, args.listen, args.data_dir)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    std::fs::create_dir_all(&config.store.data_dir)?;
    tracing::info!("Opening database in {:?}", config.store.data_dir);
    let store = DatabaseProcessor::open(&config.store.data_dir)
        .await
        .map_err(|e| {
            tracing::error!("Failed to open database: {}", e);
            e
        })?;

    let shutdown_rx = spawn_shutdown_broadcaster();

    let consumer_handle = match config.firehose {
        Some(firehose) => {
            tracing::info!(endpoint = %firehose.endpoint, "Starting firehose consumer");
            let consumer = FirehoseConsumer::new(
                JetstreamSource::new(firehose.endpoint),
                EventHandler::new(store.clone(), firehose.handler),
                firehose.consumer,
                shutdown_rx.clone(),
            );
            Some(tokio::spawn(consumer.run()))
        }
        None => {
            tracing::info!("Firehose ingestion disabled");
            None
        }
    };

    let state = AppState::new(store.clone(), config.feed);
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", config.server.listen);
    let result = run_server(router, config.server.listen, shutdown_rx).await;

    if let Some(handle) = consumer_handle {
        if result.is_err() {
            // the server never saw a shutdown signal, so stop the consumer here
            handle.abort();
        }
        match handle.await {
            Err(e) if !e.is_cancelled() => {
                tracing::error!(error = %e, "Firehose consumer task failed");
            }
            _ => tracing::info!("Firehose consumer stopped"),
        }
    }

    tracing::info!("Closing database connections...");
    store.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
