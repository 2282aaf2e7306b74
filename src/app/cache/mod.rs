//! Cache-and-fill subsystem
//!
//! Maps requests onto cache keys and keys onto complete local copies of
//! origin resources, making sure each resource is pulled from the origin at
//! most once no matter how many requests ask for it concurrently.
//!
//! # Module Organization
//!
//! - [`key`] - Collision-safe cache key derivation
//! - [`entry`] - Completed cache entries
//! - [`store`] - Key store with coalesced fills
//! - [`config`] - Configuration types and defaults
//! - [`stats`] - Hit/miss/fill counters
//!
//! # Examples
//!
//! ```rust,no_run
//! use origin_cache::app::cache::{CacheConfig, CacheStore, KeyDeriver};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CacheStore::new(&CacheConfig::default()).await?;
//! let key = KeyDeriver::derive("/image.png", "v=2")?;
//!
//! let path = store
//!     .fill_once(key, || async {
//!         // Pull from the origin and persist locally
//!         Ok(PathBuf::from("proxy-cache/3f1c.png"))
//!     })
//!     .await?;
//! println!("served from {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod key;
pub mod stats;
pub mod store;

pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use key::{CacheKey, KeyDeriver};
pub use stats::CacheStats;
pub use store::CacheStore;
