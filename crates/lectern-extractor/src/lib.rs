//! Lectern Extractor
//!
//! Schema-driven structured extraction from scientific articles.
//!
//! # Overview
//!
//! For every binding of the schema's input parameters the pipeline searches
//! the article source, ranks each article's sections against the research
//! question, asks a language model for a record of the declared output
//! features, validates the reply and writes one row per (binding, article)
//! pair.
//!
//! # Architecture
//!
//! ```text
//! Binding → Search → Fetch/Parse → PassageRanker → PromptBuilder → LLM
//!         → RecordValidator → PersistenceCoordinator → RowStore
//! ```
//!
//! # Key Features
//!
//! - **BM25 Ranking**: stemmed, per-article statistics, negative context
//! - **Deterministic Prompts**: byte-identical for identical inputs
//! - **Strict Validation**: type coercion, allowed values, length bounds
//! - **Idempotent Writes**: existing keys skipped or replaced per policy
//! - **Explicit Retries**: exponential backoff and per-call timeouts
//!
//! # Example Usage
//!
//! ```no_run
//! use lectern_domain::{MetadataColumn, Schema, SchemaDefinition, TableLayout};
//! use lectern_extractor::{ExtractorConfig, Pipeline};
//! use lectern_llm::MockProvider;
//! use lectern_sources::{DirectorySource, HeadingParser};
//! use lectern_store::SqliteRowStore;
//! use std::sync::{Arc, Mutex};
//!
//! # async fn example(definition: SchemaDefinition) -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(Schema::new(definition)?);
//! let layout = TableLayout::new("screening", &schema, &[MetadataColumn::PubmedId])?;
//!
//! let pipeline = Pipeline::new(
//!     Arc::clone(&schema),
//!     ExtractorConfig::default(),
//!     Arc::new(MockProvider::default()),
//!     Arc::new(DirectorySource::new("articles")?),
//!     Arc::new(HeadingParser::new()),
//!     Arc::new(Mutex::new(SqliteRowStore::new("screening.db")?)),
//!     layout,
//! )?;
//!
//! let summary = pipeline.run().await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod extractor;
mod parser;
mod persistence;
mod pipeline;
mod prompt;
mod ranking;
mod retry;
mod summary;
mod types;
mod validation;


pub use config::{ExtractorConfig, RetryConfig, SingleValueOverflow};
pub use error::ExtractorError;
pub use extractor::StructuredExtractor;
pub use parser::{parse_reply, Reply, ReplyField};
pub use persistence::PersistenceCoordinator;
pub use pipeline::{CancellationFlag, Pipeline};
pub use prompt::PromptBuilder;
pub use ranking::{PassageRanker, RankedSection, Tokenizer};
pub use retry::{run_blocking, BlockingError, RetryError, RetryPolicy};
pub use summary::RunSummary;
pub use types::{FailureEntry, FailureKind, KeyDecision, WriteOutcome};
pub use validation::RecordValidator;
