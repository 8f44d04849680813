//! Outcome types shared by the coordinator, pipeline and run summary

use serde::Serialize;
use std::fmt;

/// What to do with a row key before any retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    /// Run the pair; `existing` tells whether a row will be replaced
    Process {
        /// A row already exists for the key
        existing: bool,
    },
    /// A row exists and overwriting is off
    Skip,
}

/// Result of writing an accepted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// First row for the key
    Inserted,
    /// An existing row was replaced
    Replaced,
}

/// Stage at which a pair failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Search for a binding failed
    Search,
    /// Article fetch failed or the article was not found
    Retrieval,
    /// The attached document could not be parsed
    Parse,
    /// The article had no sections to rank
    NoContent,
    /// The model call failed
    Completion,
    /// The model answered but the record was rejected
    Rejected,
    /// Existence check or upsert failed
    Persistence,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Search => "search",
            FailureKind::Retrieval => "retrieval",
            FailureKind::Parse => "parse",
            FailureKind::NoContent => "no content",
            FailureKind::Completion => "completion",
            FailureKind::Rejected => "rejected",
            FailureKind::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// A failed binding or (binding, article) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    /// The binding, or the row key of the pair
    pub subject: String,
    /// Failing stage
    pub kind: FailureKind,
    /// Error message
    pub reason: String,
}
