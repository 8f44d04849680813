//! SQLite-backed row store

use crate::{normalize_row, StoreError};
use lectern_domain::{
    ColumnDef, ColumnType, ColumnValue, RowKey, RowStore, TableLayout, TableRow, UpsertAck,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a write waits for a competing lock before failing as busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based implementation of RowStore
///
/// The destination table gets an autoincrement `id`, one column per layout
/// column with its declared type, and a UNIQUE constraint over the key
/// columns.
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Share the store behind a mutex.
pub struct SqliteRowStore {
    conn: Connection,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn to_sql(value: &ColumnValue) -> Result<SqlValue, StoreError> {
    Ok(match value {
        ColumnValue::Null => SqlValue::Null,
        ColumnValue::Text(s) => SqlValue::Text(s.clone()),
        ColumnValue::Integer(i) => SqlValue::Integer(*i),
        ColumnValue::Real(f) => SqlValue::Real(*f),
        ColumnValue::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        ColumnValue::Json(v) => SqlValue::Text(
            serde_json::to_string(v).map_err(|e| StoreError::InvalidData(e.to_string()))?,
        ),
    })
}

fn from_sql(column: &ColumnDef, value: SqlValue) -> Result<ColumnValue, StoreError> {
    let invalid = |found: &str| {
        StoreError::InvalidData(format!(
            "Column '{}' declared {} holds {}",
            column.name, column.column_type, found
        ))
    };

    Ok(match (column.column_type, value) {
        (_, SqlValue::Null) => ColumnValue::Null,
        (ColumnType::Json, SqlValue::Text(s)) => ColumnValue::Json(
            serde_json::from_str(&s).map_err(|e| StoreError::InvalidData(e.to_string()))?,
        ),
        (ColumnType::Bool, SqlValue::Integer(i)) => ColumnValue::Boolean(i != 0),
        (ColumnType::Int, SqlValue::Integer(i)) => ColumnValue::Integer(i),
        (ColumnType::Float, SqlValue::Real(f)) => ColumnValue::Real(f),
        (ColumnType::Float, SqlValue::Integer(i)) => ColumnValue::Real(i as f64),
        (ColumnType::LongText | ColumnType::TinyText | ColumnType::Varchar(_), SqlValue::Text(s)) => {
            ColumnValue::Text(s)
        }
        (ColumnType::LongText | ColumnType::TinyText | ColumnType::Varchar(_), SqlValue::Integer(i)) => {
            ColumnValue::Text(i.to_string())
        }
        (ColumnType::LongText | ColumnType::TinyText | ColumnType::Varchar(_), SqlValue::Real(f)) => {
            ColumnValue::Text(f.to_string())
        }
        (_, SqlValue::Blob(_)) => return Err(invalid("a blob")),
        (_, SqlValue::Text(_)) => return Err(invalid("text")),
        (_, SqlValue::Integer(_)) => return Err(invalid("an integer")),
        (_, SqlValue::Real(_)) => return Err(invalid("a real")),
    })
}

fn key_clause(layout: &TableLayout) -> String {
    layout
        .key_columns()
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{} = ?{}", quote(name), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn key_params<'a>(layout: &'a TableLayout, key: &'a RowKey) -> Vec<&'a str> {
    layout.key_pairs(key).into_iter().map(|(_, v)| v).collect()
}

impl SqliteRowStore {
    /// Open (or create) the database at `path`
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lectern_store::SqliteRowStore;
    ///
    /// let store = SqliteRowStore::new("screening.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Statement creating the table for `layout`
    pub fn create_table_sql(layout: &TableLayout) -> String {
        let mut defs = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote("id"))];
        for column in layout.columns() {
            let not_null = if column.key { " NOT NULL" } else { "" };
            defs.push(format!("{} {}{}", quote(&column.name), column.column_type.sql(), not_null));
        }
        let key: Vec<String> = layout.key_columns().iter().map(|c| quote(c)).collect();
        defs.push(format!("UNIQUE ({})", key.join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote(layout.table()),
            defs.join(",\n    ")
        )
    }

    /// Number of rows in the table
    pub fn count(&self, layout: &TableLayout) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(layout.table()));
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn exists_on(conn: &Connection, layout: &TableLayout, key: &RowKey) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            quote(layout.table()),
            key_clause(layout)
        );
        let found = conn
            .query_row(&sql, params_from_iter(key_params(layout, key)), |_| Ok(true))
            .optional()?;
        Ok(found.unwrap_or(false))
    }
}

impl RowStore for SqliteRowStore {
    type Error = StoreError;

    fn prepare(&mut self, layout: &TableLayout) -> Result<(), Self::Error> {
        self.conn.execute_batch(&Self::create_table_sql(layout))?;
        debug!(table = %layout.table(), "Table prepared");
        Ok(())
    }

    fn reset(&mut self, layout: &TableLayout) -> Result<(), Self::Error> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(layout.table())))?;
        tx.execute_batch(&Self::create_table_sql(layout))?;
        tx.commit()?;
        debug!(table = %layout.table(), "Table reset");
        Ok(())
    }

    fn exists(&self, layout: &TableLayout, key: &RowKey) -> Result<bool, Self::Error> {
        Self::exists_on(&self.conn, layout, key)
    }

    fn fetch(&self, layout: &TableLayout, key: &RowKey) -> Result<Option<TableRow>, Self::Error> {
        let names: Vec<String> = layout.columns().iter().map(|c| quote(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            names.join(", "),
            quote(layout.table()),
            key_clause(layout)
        );

        let raw: Option<Vec<SqlValue>> = self
            .conn
            .query_row(&sql, params_from_iter(key_params(layout, key)), |row| {
                (0..layout.columns().len())
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect()
            })
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut row = TableRow::new();
        for (column, value) in layout.columns().iter().zip(raw) {
            row.push(column.name.clone(), from_sql(column, value)?);
        }
        Ok(Some(row))
    }

    fn upsert(
        &mut self,
        layout: &TableLayout,
        key: &RowKey,
        row: &TableRow,
    ) -> Result<UpsertAck, Self::Error> {
        let row = normalize_row(layout, key, row)?;

        let names: Vec<String> = row.cells().iter().map(|(name, _)| quote(name)).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let key_names: Vec<String> = layout.key_columns().iter().map(|c| quote(c)).collect();
        let updates: Vec<String> = layout
            .columns()
            .iter()
            .filter(|c| !c.key)
            .map(|c| format!("{0} = excluded.{0}", quote(&c.name)))
            .collect();

        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            quote(layout.table()),
            names.join(", "),
            placeholders.join(", "),
            key_names.join(", "),
            conflict
        );

        let values = row
            .cells()
            .iter()
            .map(|(_, v)| to_sql(v))
            .collect::<Result<Vec<_>, _>>()?;

        let tx = self.conn.transaction()?;
        let existed = Self::exists_on(&tx, layout, key)?;
        tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;

        Ok(if existed {
            UpsertAck::Updated
        } else {
            UpsertAck::Inserted
        })
    }
}
