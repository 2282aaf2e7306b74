//! origin_cache CLI application
//!
//! Caching reverse proxy: serves local copies of origin resources, pulling
//! each one from the origin at most once while the process runs.

use std::process;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use origin_cache::cli::{Cli, handle_serve, load_config};
use origin_cache::constants::logging;
use origin_cache::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = load_config(&cli).await?;

    init_logging(&config.logging.level, cli.very_verbose);

    info!("origin_cache v{} starting", env!("CARGO_PKG_VERSION"));
    handle_serve(config).await
}

/// Initialize logging from the configured level
///
/// The filter is built from configuration only; no environment variable is
/// read.
fn init_logging(level: &str, show_levels: bool) {
    let filter = EnvFilter::new(format!(
        "{},origin_cache={}",
        logging::DEPENDENCY_LOG_LEVEL,
        level.to_ascii_lowercase()
    ));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(show_levels)
        .init();
}
