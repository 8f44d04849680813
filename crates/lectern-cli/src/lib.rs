//! Lectern CLI library.
//!
//! This library provides the core functionality for the `lectern` command-line
//! interface: configuration loading, provider selection, command execution and
//! output formatting.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod provider;

pub use cli::{Cli, Command};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use output::Formatter;
