//! docker-runonce CLI entry point.
//!
//! Initializes logging, runs the container and exits with the classified code.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get the verbosity
    let cli = docker_runonce::cli::parse_cli();
    let verbose = cli.verbose;

    // Priority: RUST_LOG env var > --verbose > default "info".
    // Logs go to stderr; stdout belongs to the container.
    let default_filter = if verbose {
        "info,docker_runonce=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let outcome = docker_runonce::cli::run_with_cli(cli).await;
    let disposition = docker_runonce::cli::classify(&outcome, verbose);
    if let Some(message) = &disposition.message {
        eprintln!("{message}");
    }

    // Exit here: dropping the runtime would wait on the blocking stdin reader.
    std::process::exit(disposition.code);
}
