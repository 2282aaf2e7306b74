//! Request handling
//!
//! Every request, whatever its path or method, goes through
//! [`ProxyHandler::handle`]: derive the key, get the file through the cache
//! store (pulling it from the origin on a miss), serve it. Any failure on
//! the way is logged and answered with a plain 404.

pub mod responder;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::Uri;
use axum::response::Response;
use tracing::warn;

use crate::app::cache::{CacheStore, KeyDeriver};
use crate::app::client::OriginFetcher;
use crate::errors::{AppError, CacheError, Result};

/// Orchestrates key derivation, cache fill and serving
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    store: CacheStore,
    fetcher: Arc<OriginFetcher>,
}

impl ProxyHandler {
    /// Creates a handler over a shared store and origin fetcher
    pub fn new(store: CacheStore, fetcher: Arc<OriginFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Resolve a request target to a complete local file
    ///
    /// A miss pulls the resource through the store, so concurrent requests
    /// for the same key share one origin fetch.
    pub async fn resolve(&self, uri: &Uri) -> Result<PathBuf> {
        let key = KeyDeriver::derive(uri.path(), uri.query().unwrap_or(""))?;

        let fetcher = Arc::clone(&self.fetcher);
        let fill_key = key.clone();
        let path = self
            .store
            .fill_once(key, move || async move { fetcher.fetch(&fill_key).await })
            .await?;

        Ok(path)
    }

    /// Answer one request
    pub async fn handle(&self, uri: &Uri) -> Response {
        match self.resolve(uri).await {
            Ok(path) => responder::serve_file(&path).await,
            Err(e) => {
                let kind = match &e {
                    AppError::Cache(CacheError::FillFailed(fetch)) => fetch.kind(),
                    other => other.category(),
                };
                warn!("Request for {} failed ({}): {}", uri, kind, e);
                responder::not_found()
            }
        }
    }
}

/// Router sending every path and method to the proxy handler
pub fn build_router(handler: ProxyHandler) -> Router {
    Router::new().fallback(proxy_request).with_state(handler)
}

async fn proxy_request(State(handler): State<ProxyHandler>, uri: Uri) -> Response {
    handler.handle(&uri).await
}
