//! origin_cache Library
//!
//! A transparent caching reverse proxy. Requests are keyed by path and
//! query; a miss pulls the resource once from the origin into a local file,
//! concurrent misses for the same key share that one fetch, and every
//! cached file is removed when the process shuts down.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
