//! Shared request state

use std::time::Duration;

use recycle_edge::inference::InferenceService;
use tracing::info;

use crate::config::ServerConfig;

/// Handed to every handler; clones share one loaded artifact
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: InferenceService,
    pub timeout: Duration,
    pub default_top_k: usize,
}

/// Load the artifact named by `config`
///
/// Runs before the listener is bound, so a bad artifact keeps the server
/// from starting at all.
pub fn prepare_state(config: &ServerConfig) -> recycle_edge::Result<AppState> {
    let service = InferenceService::from_path(&config.artifact)?;
    let artifact = service.artifact();
    info!(
        "Serving '{}' {} ({} labels, input {})",
        artifact.header().name,
        artifact.header().version,
        artifact.num_classes(),
        artifact.input_shape()
    );

    Ok(AppState {
        service,
        timeout: Duration::from_millis(config.timeout_ms),
        default_top_k: config.default_top_k,
    })
}
