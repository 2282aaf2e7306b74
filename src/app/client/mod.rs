//! Origin client
//!
//! Pulls cache misses from the origin and persists them locally.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: single GET with status classification
//! - `download`: streaming body writes with partial-file cleanup

use std::path::PathBuf;

use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::app::cache::CacheKey;
use crate::errors::{FetchResult, Result};

pub mod config;
pub mod download;
pub mod http;

pub use config::ClientConfig;

use download::DownloadHandler;
use http::HttpHandler;

/// Fetches origin resources into uniquely named local files
#[derive(Debug)]
pub struct OriginFetcher {
    http_handler: HttpHandler,
    origin: Url,
    cache_dir: PathBuf,
}

impl OriginFetcher {
    /// Creates a fetcher for `origin` that writes into `cache_dir`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` if the HTTP client cannot be built
    pub fn new(origin: Url, cache_dir: PathBuf, config: &ClientConfig) -> Result<Self> {
        let client = config.build_http_client()?;
        Ok(Self {
            http_handler: HttpHandler::new(client),
            origin,
            cache_dir,
        })
    }

    /// Fresh local path for a fill of `key`: `{uuid}{extension}`
    pub fn local_path_for(&self, key: &CacheKey) -> PathBuf {
        let extension = key.extension().unwrap_or_default();
        self.cache_dir
            .join(format!("{}{}", Uuid::new_v4(), extension))
    }

    /// Pull `key` from the origin into a new local file
    ///
    /// No file is created unless the origin answers 2xx, and a file that
    /// was created is removed again if the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the URL cannot be built, the origin is
    /// unreachable or answers non-2xx, or the body cannot be stored.
    pub async fn fetch(&self, key: &CacheKey) -> FetchResult<PathBuf> {
        let url = key.origin_url(&self.origin)?;
        info!("pulling {}", url);

        let response = self.http_handler.get_response(&url).await?;

        let destination = self.local_path_for(key);
        let written = DownloadHandler::stream_to_file(response, &destination).await?;

        info!(
            "Stored {} ({} bytes) at {}",
            key,
            written,
            destination.display()
        );
        Ok(destination)
    }
}
