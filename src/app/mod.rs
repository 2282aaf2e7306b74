//! Core application logic for origin_cache
//!
//! - [`cache`]: key derivation and the coalescing cache store
//! - [`client`]: origin fetches streamed into local files
//! - [`proxy`]: the request handler and static content responder
//! - [`lifecycle`]: signal handling and the shutdown sweep
//! - [`server`]: wiring all of the above onto a listener
//!
//! # Examples
//!
//! ```rust,no_run
//! use origin_cache::app::ProxyServer;
//! use origin_cache::config::AppConfig;
//!
//! # async fn example() -> origin_cache::Result<()> {
//! let mut config = AppConfig::default();
//! config.origin.base_url = "http://assets.internal:3000".to_string();
//!
//! let server = ProxyServer::new(config).await?;
//! let report = server.run().await?;
//! println!("removed {} cached files", report.removed);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod lifecycle;
pub mod proxy;
pub mod server;

// Re-export main public API
pub use cache::{CacheConfig, CacheEntry, CacheKey, CacheStats, CacheStore, KeyDeriver};
pub use client::{ClientConfig, OriginFetcher};
pub use lifecycle::{LifecycleManager, LifecycleState, ShutdownReport};
pub use proxy::{ProxyHandler, build_router};
pub use server::ProxyServer;
