//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema definition rejected
    #[error("Schema error: {0}")]
    Schema(#[from] lectern_domain::SchemaError),

    /// Question or example could not be rendered
    #[error("Render error: {0}")]
    Render(#[from] lectern_domain::RenderError),

    /// Pipeline error
    #[error("{0}")]
    Extractor(#[from] lectern_extractor::ExtractorError),

    /// LLM provider could not be built
    #[error("LLM error: {0}")]
    Llm(#[from] lectern_llm::LlmError),

    /// Store could not be opened
    #[error("Store error: {0}")]
    Store(#[from] lectern_store::StoreError),

    /// Article source could not be opened
    #[error("Source error: {0}")]
    Source(#[from] lectern_sources::SourceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}
