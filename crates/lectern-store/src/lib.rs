//! Lectern Storage Layer
//!
//! Implements the `RowStore` trait for the screening table.
//!
//! # Architecture
//!
//! - `SqliteRowStore`: SQLite table created from the `TableLayout`, with a
//!   UNIQUE constraint over the compound key and `ON CONFLICT DO UPDATE` upserts
//! - `MemoryRowStore`: in-process map with the same semantics, for tests and
//!   dry runs
//!
//! Every upsert is its own write; there is no long-lived transaction.
//!
//! # Examples
//!
//! ```no_run
//! use lectern_store::SqliteRowStore;
//!
//! let store = SqliteRowStore::new("screening.db").unwrap();
//! // Call `RowStore::prepare` with the table layout before writing rows
//! ```

#![warn(missing_docs)]

pub mod memory;
pub mod sqlite;

use lectern_domain::{ColumnValue, Retryable, RowKey, TableLayout, TableRow};
use thiserror::Error;

pub use memory::MemoryRowStore;
pub use sqlite::SqliteRowStore;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Table has not been prepared
    #[error("Table '{0}' has not been prepared")]
    NotPrepared(String),

    /// A row names a column the layout does not have
    #[error("Unknown column '{column}' for table '{table}'")]
    UnknownColumn {
        /// Table name
        table: String,
        /// Offending column
        column: String,
    },

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

/// Arrange a row in layout order, taking key columns from `key`
///
/// Columns the row does not mention are written as NULL.
pub(crate) fn normalize_row(
    layout: &TableLayout,
    key: &RowKey,
    row: &TableRow,
) -> Result<TableRow, StoreError> {
    if let Some((column, _)) = row.cells().iter().find(|(name, _)| layout.column(name).is_none()) {
        return Err(StoreError::UnknownColumn {
            table: layout.table().to_string(),
            column: column.clone(),
        });
    }

    if layout.key_columns().len() != key.input_values.len() + 1 {
        return Err(StoreError::InvalidData(format!(
            "Key {} does not match the key columns of '{}'",
            key,
            layout.table()
        )));
    }

    let key_pairs = layout.key_pairs(key);
    let mut normalized = TableRow::new();
    for column in layout.columns() {
        let value = match key_pairs.iter().find(|(name, _)| *name == column.name) {
            Some((_, value)) => ColumnValue::Text(value.to_string()),
            None => row.get(&column.name).cloned().unwrap_or(ColumnValue::Null),
        };
        normalized.push(column.name.clone(), value);
    }
    Ok(normalized)
}
