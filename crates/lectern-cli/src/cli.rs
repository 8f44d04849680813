//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lectern - schema-driven literature screening.
#[derive(Debug, Parser)]
#[command(name = "lectern")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true, env = "LECTERN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (overrides RUST_LOG and the config file)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Screen every binding of the schema and write the results table
    Run,

    /// Drop and recreate the destination table
    ResetTable(ResetTableArgs),

    /// Load and validate the configuration, then print the table layout
    CheckConfig,
}

/// Arguments for the reset-table command.
#[derive(Debug, Parser)]
pub struct ResetTableArgs {
    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}
