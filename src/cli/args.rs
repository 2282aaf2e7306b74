//! Command-line argument parsing for origin_cache
//!
//! Every flag is optional so that an unset flag falls through to the
//! configuration file and then to the built-in default.

use std::path::PathBuf;

use clap::Parser;

/// origin_cache - transparent caching reverse proxy
#[derive(Parser, Debug)]
#[command(
    name = "origin_cache",
    version,
    about = "Caching reverse proxy that pulls each resource from the origin once",
    long_about = "Accepts HTTP requests, serves a local copy of the requested resource when it has one,
and otherwise pulls it once from the origin, stores it and serves it. Concurrent misses for the
same resource share a single origin fetch. Every cached file is removed on shutdown."
)]
pub struct Cli {
    /// Port to listen on [default: 8080]
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Origin base URL cache misses are pulled from [default: http://localhost:3000]
    #[arg(short, long, value_name = "URL")]
    pub origin: Option<String>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Directory cached files are written to [default: ./proxy-cache]
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long)]
    pub very_verbose: bool,

    /// Quiet mode - errors only
    #[arg(short, long, conflicts_with_all = ["verbose", "very_verbose"])]
    pub quiet: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level requested by the verbosity flags, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.quiet {
            Some(tracing::Level::ERROR)
        } else if self.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags() {
        let cli = Cli::try_parse_from(["origin_cache"]).unwrap();
        assert_eq!(cli.port, None);
        assert_eq!(cli.origin, None);
        assert_eq!(cli.cache_dir, None);
        assert_eq!(cli.log_level(), None);
    }

    #[test]
    fn test_port_and_origin() {
        let cli = Cli::try_parse_from([
            "origin_cache",
            "--port",
            "9090",
            "--origin",
            "http://assets.internal:8000",
            "--bind",
            "127.0.0.1",
            "--config",
            "proxy.toml",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(9090));
        assert_eq!(cli.origin.as_deref(), Some("http://assets.internal:8000"));
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.config, Some(PathBuf::from("proxy.toml")));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["origin_cache", "--port", "70000"]).is_err());
        assert!(Cli::try_parse_from(["origin_cache", "--port", "http"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let quiet = Cli::try_parse_from(["origin_cache", "-q"]).unwrap();
        let verbose = Cli::try_parse_from(["origin_cache", "-v"]).unwrap();
        let very_verbose = Cli::try_parse_from(["origin_cache", "--very-verbose"]).unwrap();

        assert_eq!(quiet.log_level(), Some(tracing::Level::ERROR));
        assert_eq!(verbose.log_level(), Some(tracing::Level::INFO));
        assert_eq!(very_verbose.log_level(), Some(tracing::Level::DEBUG));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["origin_cache", "-q", "-v"]).is_err());
    }
}
