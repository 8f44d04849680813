//! Configuration file for the CLI.

use crate::error::{CliError, Result};
use lectern_domain::{MetadataColumn, Schema, SchemaDefinition, TableLayout};
use lectern_extractor::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Full CLI configuration, one TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Screening schema
    pub schema: SchemaDefinition,

    /// Pipeline tuning
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Language model
    #[serde(default)]
    pub llm: LlmConfig,

    /// Destination table
    #[serde(default)]
    pub store: StoreConfig,

    /// Article corpus
    #[serde(default)]
    pub source: SourceConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when neither `--log-level` nor `RUST_LOG` is set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Which provider answers completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions endpoint
    OpenAi,
    /// Canned replies, no network
    Mock,
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider
    pub provider: ProviderKind,

    /// API base URL
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Reply returned by the mock provider
    pub mock_response: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_string(),
            mock_response: "{}".to_string(),
        }
    }
}

/// Destination table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,

    /// Table name
    pub table: String,

    /// Bookkeeping columns, `pubmed_id` first
    pub metadata_columns: Vec<MetadataColumn>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lectern.db"),
            table: "screening".to_string(),
            metadata_columns: vec![
                MetadataColumn::PubmedId,
                MetadataColumn::Format,
                MetadataColumn::Sections,
            ],
        }
    }
}

/// Article corpus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory of `*.json` article files
    pub articles_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            articles_dir: PathBuf::from("articles"),
        }
    }
}

impl AppConfig {
    /// Default configuration file path.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| CliError::Config("Could not find config directory".into()))?;
        Ok(dir.join("lectern").join("config.toml"))
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a configuration file.
    ///
    /// Relative store and corpus paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&contents)?;

        if let Some(base) = path.parent() {
            config.store.path = resolve(base, &config.store.path);
            config.source.articles_dir = resolve(base, &config.source.articles_dir);
        }
        Ok(config)
    }

    /// Check the settings that are not checked when building the schema.
    pub fn validate(&self) -> Result<()> {
        self.extractor.validate().map_err(CliError::Config)?;

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(CliError::Config(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.llm.provider == ProviderKind::OpenAi {
            if self.llm.endpoint.trim().is_empty() {
                return Err(CliError::Config("llm.endpoint must not be empty".to_string()));
            }
            if self.llm.model.trim().is_empty() {
                return Err(CliError::Config("llm.model must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Validate the schema definition.
    pub fn schema(&self) -> Result<Schema> {
        Ok(Schema::new(self.schema.clone())?)
    }

    /// Table layout for `schema`.
    pub fn layout(&self, schema: &Schema) -> Result<TableLayout> {
        Ok(TableLayout::new(
            self.store.table.clone(),
            schema,
            &self.store.metadata_columns,
        )?)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
