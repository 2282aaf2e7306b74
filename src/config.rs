//! Configuration management for origin_cache
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file passed with `--config`, and command line flags.
//! Environment variables are never consulted.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::{CacheConfig, ClientConfig};
use crate::cli::Cli;
use crate::constants::{files, http, logging, origin, server, shutdown};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener settings
    pub server: ServerConfigToml,
    /// Origin settings
    pub origin: OriginConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Cache directory settings
    pub cache: CacheConfigToml,
    /// Shutdown sequencing
    pub shutdown: ShutdownConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfigToml {
    /// Address to bind
    pub bind: String,
    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,
}

impl Default for ServerConfigToml {
    fn default() -> Self {
        Self {
            bind: server::DEFAULT_BIND.to_string(),
            port: server::DEFAULT_PORT,
        }
    }
}

/// TOML-friendly origin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfigToml {
    /// Base URL cache misses are pulled from
    pub base_url: String,
    /// Follow origin redirects instead of failing the fill
    pub follow_redirects: bool,
}

impl Default for OriginConfigToml {
    fn default() -> Self {
        Self {
            base_url: origin::DEFAULT_ORIGIN.to_string(),
            follow_redirects: false,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Whole-request timeout, body included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// TCP keep-alive interval (unset = disabled)
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout (unset = no timeout)
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
        }
    }
}

/// TOML-friendly cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Directory cache files are written to
    pub cache_dir: PathBuf,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(files::DEFAULT_CACHE_DIR),
        }
    }
}

/// TOML-friendly shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfigToml {
    /// How long to wait for in-flight fills before sweeping
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// How long open connections get once the sweep is done
    #[serde(with = "humantime_serde")]
    pub server_drain_timeout: Duration,
}

impl Default for ShutdownConfigToml {
    fn default() -> Self {
        Self {
            timeout: shutdown::FILL_DRAIN_TIMEOUT,
            server_drain_timeout: shutdown::SERVER_DRAIN_TIMEOUT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level for this crate: error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl AppConfig {
    /// Load configuration from an optional TOML file
    ///
    /// Without a path the built-in defaults are returned.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotFound` if the given file does not exist
    /// - `ConfigError::Read` if it cannot be read
    /// - `ConfigError::InvalidFormat` if it is not valid TOML for this schema
    pub async fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text; missing keys take defaults
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command line overrides on top of file and default values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(bind) = &cli.bind {
            self.server.bind = bind.clone();
        }
        if let Some(origin) = &cli.origin {
            self.origin.base_url = origin.clone();
        }
        if let Some(cache_dir) = &cli.cache_dir {
            self.cache.cache_dir = cache_dir.clone();
        }
        if let Some(level) = cli.log_level() {
            self.logging.level = level.as_str().to_ascii_lowercase();
        }
    }

    /// Check every value that startup depends on
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field
    pub fn validate(&self) -> ConfigResult<()> {
        self.origin_url()?;
        self.bind_addr()?;

        if self.cache.cache_dir.as_os_str().is_empty() {
            return Err(invalid("cache.cache_dir", "", "cache directory must not be empty"));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(
                "logging.level",
                &self.logging.level,
                "expected one of error, warn, info, debug, trace",
            ));
        }

        Ok(())
    }

    /// Origin base URL; must be absolute http(s) with a host
    pub fn origin_url(&self) -> ConfigResult<Url> {
        let raw = &self.origin.base_url;
        let url = Url::parse(raw)
            .map_err(|e| invalid("origin.base_url", raw, &e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("origin.base_url", raw, "origin must use http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("origin.base_url", raw, "origin must name a host"));
        }

        Ok(url)
    }

    /// Socket address the listener binds
    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        let ip: IpAddr = self
            .server
            .bind
            .parse()
            .map_err(|_| invalid("server.bind", &self.server.bind, "not an IP address"))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Runtime configuration for the origin client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            follow_redirects: self.origin.follow_redirects,
            tcp_keepalive: self.client.tcp_keepalive,
            tcp_nodelay: self.client.tcp_nodelay,
            pool_idle_timeout: self.client.pool_idle_timeout,
            pool_max_per_host: self.client.pool_max_per_host,
            request_timeout: self.client.request_timeout,
            connect_timeout: self.client.connect_timeout,
        }
    }

    /// Runtime configuration for the cache store
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::with_cache_dir(self.cache.cache_dir.clone())
            .with_fill_drain_timeout(self.shutdown.timeout)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
