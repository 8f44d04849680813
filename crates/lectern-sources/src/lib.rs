//! Lectern Article Sources
//!
//! Article retrieval and document parsing collaborators.
//!
//! # Components
//!
//! - `DirectorySource`: a literature index backed by a directory of article
//!   JSON files, answering PubMed-style boolean queries
//! - `HeadingParser`: splits a plain-text or markdown document into sections
//!   at its headings
//!
//! # Article files
//!
//! ```json
//! {
//!   "id": "31234567",
//!   "format": "PUBMED",
//!   "sections": [{"heading": "Abstract", "text": "..."}],
//!   "attachment": "31234567.md"
//! }
//! ```
//!
//! `attachment` is a path relative to the directory; its bytes are handed to
//! the document parser by the pipeline.

#![warn(missing_docs)]

pub mod directory;
pub mod parser;

use lectern_domain::Retryable;
use std::path::PathBuf;
use thiserror::Error;

pub use directory::DirectorySource;
pub use parser::HeadingParser;

/// Errors from article retrieval and document parsing
#[derive(Error, Debug)]
pub enum SourceError {
    /// Filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// An article file could not be decoded
    #[error("Malformed article file {path}: {reason}")]
    Malformed {
        /// Offending file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// Two files declare the same article id
    #[error("Article '{0}' is declared by more than one file")]
    DuplicateArticle(String),

    /// The search query cannot be interpreted
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A raw document is not UTF-8 text
    #[error("Document is not UTF-8 text")]
    NotText,

    /// A raw document yielded no sections
    #[error("Document contains no text")]
    EmptyDocument,
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
