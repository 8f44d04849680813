//! Lectern CLI - schema-driven literature screening.

use clap::Parser;
use lectern_cli::commands;
use lectern_cli::{AppConfig, Cli, Command, Formatter};
use lectern_extractor::CancellationFlag;
use std::io::IsTerminal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> lectern_cli::Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load(&path)?;
    init_tracing(cli.log_level.as_deref(), &config.logging.level);
    info!(config = %path.display(), "Configuration loaded");

    let color_enabled = !cli.no_color && std::io::stdout().is_terminal();
    let formatter = Formatter::new(color_enabled);

    match cli.command {
        Command::Run => {
            let cancel = CancellationFlag::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing the current binding");
                    on_signal.cancel();
                }
            });
            commands::execute_run(&config, &formatter, cancel).await?;
        }
        Command::ResetTable(args) => {
            commands::execute_reset_table(args, &config, &formatter).await?;
        }
        Command::CheckConfig => {
            commands::execute_check_config(&config, &formatter)?;
        }
    }

    Ok(())
}

/// Log to stderr; `--log-level` wins over `RUST_LOG`, which wins over the file.
fn init_tracing(cli_level: Option<&str>, config_level: &str) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}
