//! Application constants for origin_cache
//!
//! Centralizes the defaults used by the CLI, the configuration file and the
//! runtime components, organized by functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// User agent sent to the origin
    pub const USER_AGENT: &str = concat!("origin_cache/", env!("CARGO_PKG_VERSION"));

    /// Whole-request timeout for an origin fetch
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections kept per origin host
    pub const POOL_MAX_PER_HOST: usize = 32;
}

/// Listener configuration
pub mod server {
    /// Default listening port
    pub const DEFAULT_PORT: u16 = 8080;

    /// Default bind address
    pub const DEFAULT_BIND: &str = "0.0.0.0";

    /// Body returned for every failed request
    pub const NOT_FOUND_BODY: &str = "File not found";
}

/// Origin defaults
pub mod origin {
    /// Origin cache misses are pulled from
    pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
}

/// Local cache file constants
pub mod files {
    /// Directory cache files are written to
    pub const DEFAULT_CACHE_DIR: &str = "proxy-cache";

    /// Longest extension carried over to a cache file name
    pub const MAX_EXTENSION_LEN: usize = 16;
}

/// Shutdown sequencing
pub mod shutdown {
    use super::Duration;

    /// How long the sweep waits for in-flight fills before removing files
    pub const FILL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

    /// How long aborted fills get to drop and remove their partial files
    pub const ABORT_GRACE: Duration = Duration::from_secs(1);

    /// How long the listener gets to finish open connections after the sweep
    pub const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Logging constants
pub mod logging {
    /// Default log level for this crate
    pub const DEFAULT_LOG_LEVEL: &str = "info";

    /// Log level applied to dependencies
    pub const DEPENDENCY_LOG_LEVEL: &str = "warn";
}

pub use files::DEFAULT_CACHE_DIR;
pub use http::USER_AGENT;
pub use origin::DEFAULT_ORIGIN;
pub use server::DEFAULT_PORT;
