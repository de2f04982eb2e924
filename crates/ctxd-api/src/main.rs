//! ctxd entry point.
//!
//! Parses CLI arguments, sets up tracing and configuration, then runs the
//! server or a one-shot maintenance command.

mod cli;
mod http;
mod state;

use clap::Parser;

use ctxd_infra::config::load_config;
use ctxd_observe::tracing_setup::{LogFormat, TracingOptions, default_filter, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        format: if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty },
        default_filter: default_filter(cli.verbose, cli.quiet),
        enable_otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let mut config = load_config(&cli.config).await?;

    let result = match cli.command {
        Commands::Serve {
            listen,
            inference_url,
            inference_api_key,
        } => {
            cli::apply_overrides(&mut config, listen, inference_url, inference_api_key);
            cli::serve::serve(config).await
        }
        Commands::Bootstrap => cli::maintenance::bootstrap(&config).await,
        Commands::Cleanup => cli::maintenance::cleanup(&config).await,
    };

    shutdown_tracing();
    result
}
