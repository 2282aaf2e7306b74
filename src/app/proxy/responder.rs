//! Static content responder
//!
//! Serves a local file with a content type guessed from its extension.
//! The body is streamed from disk, so large files are never held in memory.

use std::io;
use std::path::Path;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::constants::server;

/// Stream the contents of `path`, or "not found" if it cannot be opened
pub async fn serve_file(path: &Path) -> Response {
    match open_with_len(path).await {
        Ok((file, len)) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.essence_str().to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Failed to open cached file {}: {}", path.display(), e);
            not_found()
        }
    }
}

async fn open_with_len(path: &Path) -> io::Result<(File, u64)> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((file, len))
}

/// Uniform failure response; callers never see why a request failed
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, server::NOT_FOUND_BODY).into_response()
}
