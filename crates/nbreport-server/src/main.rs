// nbreport-server/src/main.rs
// ============================================================================
// Module: nbreport Binary
// Description: Command line entry point for the report service.
// Purpose: Parse arguments, initialize logging, load configuration, serve.
// Dependencies: clap, nbreport-config, nbreport-server, tokio, tracing,
//               tracing-subscriber
// ============================================================================

//! ## Overview
//! The binary is deliberately small: argument parsing, logging setup, config
//! loading, and a call into [`nbreport_server::serve`]. `RUST_LOG` overrides
//! the log filter; otherwise `--debug` selects `debug` and the default is
//! `info`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nbreport_config::ReportConfig;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Notebook report service.
#[derive(Parser, Debug)]
#[command(name = "nbreport", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Binary entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let config = match ReportConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = nbreport_server::serve(&config).await {
        tracing::error!(error = %err, "server exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Initializes the tracing subscriber with the effective filter.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
