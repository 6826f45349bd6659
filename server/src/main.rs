//! recycle-edge-server: HTTP upload front-end for the recycle_edge classifier
//!
//! Loads one artifact at startup (refusing to start if it cannot) and
//! exposes `GET /health`, `GET /model` and `POST /classify`.

mod config;
mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use recycle_edge::utils::logging::{init_logging, LogConfig, LogLevel};
use tokio::net::TcpListener;
use tracing::{error, info};

use config::{Args, ServerConfig};
use state::prepare_state;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::from_args(&args)?;

    let mut log_config = LogConfig::production();
    log_config.level = LogLevel::from_name(&config.log_level);
    let _ = init_logging(&log_config);

    info!("Starting recycle-edge-server {}", env!("CARGO_PKG_VERSION"));

    let state = match prepare_state(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("Refusing to start: {}", e);
            return Err(e.into());
        }
    };

    let app = routes::router(state, config.max_upload_bytes);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
