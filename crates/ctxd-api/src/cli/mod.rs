//! CLI definitions for the `ctxd` binary.

pub mod maintenance;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ctxd_infra::config::DEFAULT_CONFIG_FILE;
use ctxd_types::config::ServerConfig;

/// Context-managing proxy in front of a llama.cpp inference server.
#[derive(Parser)]
#[command(name = "ctxd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = "CTXD_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More logging (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Address to listen on, overriding `listen_addr`.
        #[arg(long, env = "CTXD_LISTEN")]
        listen: Option<String>,

        /// Inference server base URL, overriding `[inference] base_url`.
        #[arg(long, env = "CTXD_INFERENCE_URL")]
        inference_url: Option<String>,

        /// Bearer token for the inference server.
        #[arg(long, env = "CTXD_INFERENCE_API_KEY", hide_env_values = true)]
        inference_api_key: Option<String>,
    },

    /// Create and replicate the context keygroup, then exit.
    Bootstrap,

    /// Delete expired sessions from the history database once, then exit.
    Cleanup,
}

/// Apply `serve` overrides on top of the loaded configuration.
pub fn apply_overrides(
    config: &mut ServerConfig,
    listen: Option<String>,
    inference_url: Option<String>,
    inference_api_key: Option<String>,
) {
    if let Some(listen) = listen {
        config.listen_addr = listen;
    }
    if let Some(url) = inference_url {
        config.inference.base_url = url;
    }
    if let Some(key) = inference_api_key {
        config.inference.api_key = Some(key);
    }
}
