//! Error types for the extraction pipeline

use crate::retry::RetryError;
use lectern_domain::{RenderError, SchemaError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while processing one (binding, article) pair
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// Search or fetch failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// The article's raw document could not be parsed
    #[error("Document parse error: {0}")]
    Parse(String),

    /// The reply violated the schema for required features
    #[error("Record rejected, invalid required features: {}", .fields.join(", "))]
    Validation {
        /// Names of the required features that failed
        fields: Vec<String>,
        /// One message per violation
        details: Vec<String>,
    },

    /// Upsert or existence check failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// A call did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The model reply is not a JSON object
    #[error("Invalid reply format: {0}")]
    InvalidFormat(String),

    /// Prompt rendering failed
    #[error("Prompt rendering failed: {0}")]
    Render(#[from] RenderError),

    /// Schema or table layout error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExtractorError {
    /// True when the model answered but the answer was unusable
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExtractorError::Validation { .. } | ExtractorError::InvalidFormat(_)
        )
    }

    /// Convert a retry failure, wrapping collaborator errors with `wrap`
    pub fn from_retry<E: fmt::Display>(error: RetryError<E>, wrap: fn(String) -> Self) -> Self {
        match error {
            RetryError::TimedOut { timeout, .. } => ExtractorError::Timeout(timeout),
            other => wrap(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::InvalidFormat(e.to_string())
    }
}
