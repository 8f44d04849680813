//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the extraction pipeline and
//! infrastructure. Implementations live in other crates.

use crate::article::{Article, Section};
use crate::row::{RowKey, TableLayout, TableRow};

/// Classification of collaborator errors for the retry policy
pub trait Retryable {
    /// True when repeating the call may succeed (timeouts, rate limits, busy stores)
    fn is_transient(&self) -> bool;
}

/// Trait for language-model completion
///
/// Implemented by the infrastructure layer (lectern-llm)
pub trait LlmProvider {
    /// Error type for completion calls
    type Error;

    /// Complete a prompt, returning the raw model reply
    fn complete(&self, prompt: &str) -> Result<String, Self::Error>;

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

/// Trait for article retrieval from a literature index
///
/// Implemented by the infrastructure layer (lectern-sources)
pub trait ArticleSource {
    /// Error type for retrieval operations
    type Error;

    /// Article identifiers matching a boolean query, best first
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, Self::Error>;

    /// Fetch an article; `None` when the index has no such article
    fn fetch(&self, article_id: &str) -> Result<Option<Article>, Self::Error>;
}

/// Trait for converting raw documents into sections
///
/// Implemented by the infrastructure layer (lectern-sources)
pub trait DocumentParser {
    /// Error type for parsing
    type Error;

    /// Split a raw document into sections
    fn parse(&self, raw: &[u8]) -> Result<Vec<Section>, Self::Error>;
}

/// Acknowledgement of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAck {
    /// No row existed for the key
    Inserted,
    /// An existing row was replaced
    Updated,
}

/// Trait for the destination table
///
/// Implemented by the infrastructure layer (lectern-store). Each call is its
/// own write; the store enforces uniqueness of the compound key.
pub trait RowStore {
    /// Error type for store operations
    type Error;

    /// Create the table if it does not exist
    fn prepare(&mut self, layout: &TableLayout) -> Result<(), Self::Error>;

    /// Drop and recreate the table
    fn reset(&mut self, layout: &TableLayout) -> Result<(), Self::Error>;

    /// Whether a row exists for `key`
    fn exists(&self, layout: &TableLayout, key: &RowKey) -> Result<bool, Self::Error>;

    /// Read back the row for `key`
    fn fetch(&self, layout: &TableLayout, key: &RowKey) -> Result<Option<TableRow>, Self::Error>;

    /// Insert the row, or replace the existing row with the same key
    fn upsert(
        &mut self,
        layout: &TableLayout,
        key: &RowKey,
        row: &TableRow,
    ) -> Result<UpsertAck, Self::Error>;
}
