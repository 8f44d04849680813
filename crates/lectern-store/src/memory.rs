//! In-memory row store

use crate::{normalize_row, StoreError};
use lectern_domain::{RowKey, RowStore, TableLayout, TableRow, UpsertAck};
use std::collections::{BTreeMap, HashMap};

/// Row store kept in process memory
///
/// Same keying and overwrite semantics as the SQLite store, without
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: HashMap<String, BTreeMap<RowKey, TableRow>>,
}

impl MemoryRowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the table, 0 if it was never prepared
    pub fn count(&self, layout: &TableLayout) -> usize {
        self.tables.get(layout.table()).map_or(0, BTreeMap::len)
    }

    fn table(&self, layout: &TableLayout) -> Result<&BTreeMap<RowKey, TableRow>, StoreError> {
        self.tables
            .get(layout.table())
            .ok_or_else(|| StoreError::NotPrepared(layout.table().to_string()))
    }
}

impl RowStore for MemoryRowStore {
    type Error = StoreError;

    fn prepare(&mut self, layout: &TableLayout) -> Result<(), Self::Error> {
        self.tables.entry(layout.table().to_string()).or_default();
        Ok(())
    }

    fn reset(&mut self, layout: &TableLayout) -> Result<(), Self::Error> {
        self.tables.insert(layout.table().to_string(), BTreeMap::new());
        Ok(())
    }

    fn exists(&self, layout: &TableLayout, key: &RowKey) -> Result<bool, Self::Error> {
        Ok(self.table(layout)?.contains_key(key))
    }

    fn fetch(&self, layout: &TableLayout, key: &RowKey) -> Result<Option<TableRow>, Self::Error> {
        Ok(self.table(layout)?.get(key).cloned())
    }

    fn upsert(
        &mut self,
        layout: &TableLayout,
        key: &RowKey,
        row: &TableRow,
    ) -> Result<UpsertAck, Self::Error> {
        let row = normalize_row(layout, key, row)?;
        let table = self
            .tables
            .get_mut(layout.table())
            .ok_or_else(|| StoreError::NotPrepared(layout.table().to_string()))?;
        Ok(match table.insert(key.clone(), row) {
            Some(_) => UpsertAck::Updated,
            None => UpsertAck::Inserted,
        })
    }
}
