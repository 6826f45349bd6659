//! Server configuration: optional TOML file, then CLI/env overrides

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "recycle-edge.toml";

/// HTTP front-end for the recycle_edge classifier
#[derive(Parser, Debug, Default)]
#[command(name = "recycle-edge-server")]
#[command(version)]
#[command(about = "Serve a quantized recycle classifier over HTTP", long_about = None)]
pub struct Args {
    /// TOML config file
    #[arg(short, long, env = "RECYCLE_EDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Artifact to serve (overrides the config file)
    #[arg(short, long, env = "RECYCLE_EDGE_ARTIFACT")]
    pub artifact: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "RECYCLE_EDGE_HOST")]
    pub host: Option<String>,

    /// Bind port
    #[arg(short, long, env = "RECYCLE_EDGE_PORT")]
    pub port: Option<u16>,

    /// Per-request classification bound in milliseconds
    #[arg(long, env = "RECYCLE_EDGE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Artifact loaded once at startup
    pub artifact: PathBuf,
    pub timeout_ms: u64,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Ranked labels returned when the request sets no `top_k`
    pub default_top_k: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            artifact: PathBuf::from("models/recycle.rclf"),
            timeout_ms: recycle_edge::inference::DEFAULT_TIMEOUT_MS,
            max_upload_bytes: 10 * 1024 * 1024,
            default_top_k: 3,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the effective configuration for `args`
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(artifact) = &args.artifact {
            self.artifact = artifact.clone();
        }
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if args.verbose {
            self.log_level = "debug".to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be at least 1");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be at least 1");
        }
        if self.default_top_k == 0 {
            bail!("default_top_k must be at least 1");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
