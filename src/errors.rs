//! Error types for origin_cache
//!
//! Errors are grouped by the component that raises them. Everything on the
//! request path stops at the proxy handler, where it is logged and turned
//! into a uniform "not found" response; only startup errors reach `main`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Cache key derivation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Request path or query contains characters that cannot form a key
    #[error("Malformed request URL: {reason}")]
    MalformedRequest { reason: String },

    /// Joining the origin base with the key did not produce a valid URL
    #[error("Invalid origin URL {url}: {error}")]
    InvalidOriginUrl { url: String, error: String },
}

/// Origin fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection or transport failure reaching the origin
    #[error("Origin unavailable: {url}")]
    OriginUnavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Origin answered with a status outside 2xx
    #[error("Origin returned HTTP {status} for {url}")]
    OriginNon2xx { url: String, status: u16 },

    /// Response body stream failed part-way through
    #[error("Origin body interrupted after {received} bytes: {url}")]
    BodyInterrupted {
        url: String,
        received: u64,
        #[source]
        source: reqwest::Error,
    },

    /// Local file could not be created, written or removed
    #[error("Local file I/O failed: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key could not be turned into an origin URL
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Cache store errors
///
/// Cloneable so that one fill outcome can be handed to every coalesced
/// waiter.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The fill function returned an error; nothing was registered
    #[error("Cache fill failed: {0}")]
    FillFailed(#[source] Arc<FetchError>),

    /// The fill task panicked or was cancelled before completing
    #[error("Cache fill aborted: {reason}")]
    FillAborted { reason: String },

    /// Store has been closed for shutdown
    #[error("Cache store is shutting down")]
    ShuttingDown,

    /// Cache directory missing and could not be created
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    /// Key derivation error
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Origin fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Cache store error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP client or listener setup failed
    #[error("Server error: {message}")]
    Server { message: String },

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Create a server setup error with a message
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Key(_) => "key",
            AppError::Fetch(_) => "fetch",
            AppError::Cache(_) => "cache",
            AppError::Config(_) => "config",
            AppError::Server { .. } => "server",
            AppError::Io(_) => "io",
        }
    }
}

impl FetchError {
    /// Short label used in request logs
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::OriginUnavailable { .. } => "origin_unavailable",
            FetchError::OriginNon2xx { .. } => "origin_non_2xx",
            FetchError::BodyInterrupted { .. } => "body_interrupted",
            FetchError::Io { .. } => "local_io",
            FetchError::Key(_) => "key",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Key derivation result type alias
pub type KeyResult<T> = std::result::Result<T, KeyError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::from(KeyError::MalformedRequest {
            reason: "space".to_string(),
        });
        assert_eq!(err.category(), "key");

        let err = AppError::from(CacheError::ShuttingDown);
        assert_eq!(err.category(), "cache");

        assert_eq!(AppError::server("bind").category(), "server");
    }

    #[test]
    fn test_fetch_error_kind() {
        let err = FetchError::OriginNon2xx {
            url: "http://origin/x".to_string(),
            status: 500,
        };
        assert_eq!(err.kind(), "origin_non_2xx");
        assert!(err.to_string().contains("500"));

        let err = FetchError::Io {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(err.kind(), "local_io");
    }

    #[test]
    fn test_cache_error_is_shared_between_waiters() {
        let err = CacheError::FillFailed(Arc::new(FetchError::OriginNon2xx {
            url: "http://origin/x".to_string(),
            status: 404,
        }));
        let copy = err.clone();
        match (err, copy) {
            (CacheError::FillFailed(a), CacheError::FillFailed(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
