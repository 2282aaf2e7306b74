//! Cache configuration types and defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{files, shutdown};

/// Configuration for the cache store and its shutdown sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory cache files are written to
    pub cache_dir: PathBuf,
    /// How long shutdown waits for in-flight fills before sweeping
    pub fill_drain_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(files::DEFAULT_CACHE_DIR),
            fill_drain_timeout: shutdown::FILL_DRAIN_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with a custom cache directory
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            ..Default::default()
        }
    }

    /// Set the in-flight fill drain timeout
    pub fn with_fill_drain_timeout(mut self, timeout: Duration) -> Self {
        self.fill_drain_timeout = timeout;
        self
    }
}
