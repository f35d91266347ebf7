//! backoffice - command-line client for the business-management API.
//!
//! Logs in against the backend, keeps the session in the OS-appropriate
//! data directory (or only for the life of the process), and issues
//! authenticated calls with transparent token renewal.

mod cli;
mod commands;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use backoffice_core::Config;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use commands::App;

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "backoffice.log";

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr and to a daily-rolling file in the cache directory.
/// The returned guard must stay alive for the file writer to flush.
fn init_tracing(config: &Config, verbose: u8) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match config.log_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;
    let _log_guard = init_tracing(&config, cli.verbose);

    let base_url = config.base_url(cli.api_url.clone());
    info!(%base_url, "backoffice starting");

    let mut app = App::new(config, base_url)?;
    // Returning lets `_log_guard` flush the log file before exit
    Ok(commands::exit_code(app.run(cli.command).await))
}
