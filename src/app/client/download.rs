//! Streaming an origin body into a local file
//!
//! The destination is only created once the origin has answered 2xx. Until
//! the body is fully written and flushed the file is owned by a guard that
//! removes it when dropped. That covers error returns as well as the fill
//! task being aborted or its runtime shutting down mid-transfer.

use std::path::Path;

use reqwest::Response;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::app::cache::entry::FileGuard;
use crate::errors::{FetchError, FetchResult};

/// Writes response bodies to disk
pub struct DownloadHandler;

impl DownloadHandler {
    /// Stream `response` into a new file at `destination`
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - `FetchError::Io` if the file cannot be created or written
    /// - `FetchError::BodyInterrupted` if the body stream fails part-way
    pub async fn stream_to_file(response: Response, destination: &Path) -> FetchResult<u64> {
        let url = response.url().to_string();

        // Declared before the file so the handle closes before removal
        let guard = FileGuard::new(destination);
        let mut file = File::create(destination)
            .await
            .map_err(|source| FetchError::Io {
                path: destination.to_path_buf(),
                source,
            })?;

        let written = Self::write_body(response, &mut file, destination, &url).await?;
        drop(file);
        guard.disarm();

        debug!("Wrote {} bytes to {}", written, destination.display());
        Ok(written)
    }

    async fn write_body(
        mut response: Response,
        file: &mut File,
        destination: &Path,
        url: &str,
    ) -> FetchResult<u64> {
        let io_error = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut received: u64 = 0;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await.map_err(io_error)?;
                    received += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(FetchError::BodyInterrupted {
                        url: url.to_string(),
                        received,
                        source,
                    });
                }
            }
        }

        file.flush().await.map_err(io_error)?;
        Ok(received)
    }
}
