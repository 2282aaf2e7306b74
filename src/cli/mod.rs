//! Command-line interface components
//!
//! Argument parsing and the handler that turns parsed arguments into a
//! running proxy.

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::{handle_serve, load_config};
