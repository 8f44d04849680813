//! Configuration for the extraction pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when a single-valued feature receives several values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleValueOverflow {
    /// Keep the first value and attach a warning
    #[default]
    TakeFirst,
    /// Treat the field as invalid
    Reject,
}

/// Retry schedule for network-bound calls and upserts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Wait before the second attempt (milliseconds)
    pub initial_backoff_ms: u64,

    /// Upper bound on any wait (milliseconds)
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive waits
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Validate the retry schedule
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be greater than 0".to_string());
        }
        if self.initial_backoff_ms == 0 {
            return Err("retry.initial_backoff_ms must be greater than 0".to_string());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("retry.max_backoff_ms cannot be below retry.initial_backoff_ms".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("retry.multiplier must be at least 1.0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the extraction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Sections shown to the model per article
    pub top_sections_per_article: usize,

    /// Articles requested per search
    pub max_articles_per_search: usize,

    /// Extra terms appended to every search query
    pub additional_search_keywords: String,

    /// Re-extract and replace rows that already exist
    pub overwrite_existing: bool,

    /// Keep English stop words when tokenizing for ranking
    pub keep_stop_words: bool,

    /// BM25 term saturation
    pub bm25_k1: f64,

    /// BM25 length normalisation
    pub bm25_b: f64,

    /// Weight of negative-context terms in ranking
    pub negative_weight: f64,

    /// Policy for single-valued features that receive several values
    pub single_value_overflow: SingleValueOverflow,

    /// Maximum time for one completion call (seconds)
    pub completion_timeout_secs: u64,

    /// Maximum time for one search, fetch, parse or store call (seconds)
    pub network_timeout_secs: u64,

    /// Retry schedule
    pub retry: RetryConfig,
}

impl ExtractorConfig {
    /// Get the completion timeout as a Duration
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// Get the network timeout as a Duration
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.top_sections_per_article == 0 {
            return Err("top_sections_per_article must be greater than 0".to_string());
        }
        if self.max_articles_per_search == 0 {
            return Err("max_articles_per_search must be greater than 0".to_string());
        }
        if !self.bm25_k1.is_finite() || self.bm25_k1 <= 0.0 {
            return Err("bm25_k1 must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err("bm25_b must be within [0, 1]".to_string());
        }
        if !self.negative_weight.is_finite() || self.negative_weight < 0.0 {
            return Err("negative_weight cannot be negative".to_string());
        }
        if self.completion_timeout_secs == 0 {
            return Err("completion_timeout_secs must be greater than 0".to_string());
        }
        if self.network_timeout_secs == 0 {
            return Err("network_timeout_secs must be greater than 0".to_string());
        }
        self.retry.validate()
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            top_sections_per_article: 5,
            max_articles_per_search: 10,
            additional_search_keywords: String::new(),
            overwrite_existing: false,
            keep_stop_words: false,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            negative_weight: 0.5,
            single_value_overflow: SingleValueOverflow::TakeFirst,
            completion_timeout_secs: 120,
            network_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// Aggressive preset: fewer sections and articles, short timeouts, few retries
    pub fn aggressive() -> Self {
        Self {
            top_sections_per_article: 3,
            max_articles_per_search: 5,
            completion_timeout_secs: 60,
            network_timeout_secs: 30,
            single_value_overflow: SingleValueOverflow::Reject,
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 100,
                max_backoff_ms: 1_000,
                multiplier: 2.0,
            },
            ..Self::default()
        }
    }

    /// Lenient preset: more context per article, long timeouts, patient retries
    pub fn lenient() -> Self {
        Self {
            top_sections_per_article: 8,
            max_articles_per_search: 20,
            completion_timeout_secs: 300,
            network_timeout_secs: 120,
            retry: RetryConfig {
                max_attempts: 8,
                initial_backoff_ms: 250,
                max_backoff_ms: 30_000,
                multiplier: 2.0,
            },
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExtractorConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.overwrite_existing);
        assert_eq!(config.single_value_overflow, SingleValueOverflow::TakeFirst);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(ExtractorConfig::aggressive().validate().is_ok());
        assert!(ExtractorConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ExtractorConfig::default();
        config.top_sections_per_article = 0;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.bm25_b = 1.5;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.negative_weight = -0.1;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ExtractorConfig::from_toml(
            r#"
top_sections_per_article = 2
single_value_overflow = "reject"

[retry]
max_attempts = 2
"#,
        )
        .unwrap();
        assert_eq!(config.top_sections_per_article, 2);
        assert_eq!(config.single_value_overflow, SingleValueOverflow::Reject);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 100);
        assert_eq!(config.max_articles_per_search, 10);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ExtractorConfig::lenient();
        let toml_str = config.to_toml().unwrap();
        let parsed = ExtractorConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
