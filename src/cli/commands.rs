//! Command handlers for the origin_cache CLI
//!
//! Glue between parsed arguments and the proxy server.

use tracing::{info, warn};

use crate::app::ProxyServer;
use crate::cli::Cli;
use crate::config::AppConfig;
use crate::errors::Result;

/// Build the effective configuration: defaults, then file, then flags
pub async fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).await?;
    config.apply_cli(cli);
    config.validate()?;
    Ok(config)
}

/// Run the proxy until a termination signal, then clean the cache
pub async fn handle_serve(config: AppConfig) -> Result<()> {
    let server = ProxyServer::new(config).await?;
    let report = server.run().await?;

    if report.failed > 0 {
        warn!("{} cached files could not be removed", report.failed);
    }
    if report.abandoned_fills > 0 {
        warn!(
            "{} fills were still running at exit",
            report.abandoned_fills
        );
    }
    info!(
        "Served {} hits from {} origin fetches",
        report.stats.hits, report.stats.fills_succeeded
    );
    Ok(())
}
