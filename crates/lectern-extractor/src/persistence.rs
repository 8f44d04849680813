//! Persistence coordination: dedup/overwrite decisions and row writes

use crate::error::ExtractorError;
use crate::ranking::RankedSection;
use crate::retry::{run_blocking, RetryPolicy};
use crate::types::{KeyDecision, WriteOutcome};
use lectern_domain::{
    Article, ColumnRole, ColumnValue, Extracted, ExtractionRecord, FieldValue, MetadataColumn,
    Retryable, RowKey, RowStore, TableLayout, TableRow, UpsertAck,
};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Error of one store call made through the coordinator
#[derive(Debug)]
enum StoreCallError<E> {
    Store(E),
    Poisoned,
}

impl<E: fmt::Display> fmt::Display for StoreCallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreCallError::Store(e) => write!(f, "{}", e),
            StoreCallError::Poisoned => f.write_str("store lock poisoned"),
        }
    }
}

impl<E: Retryable> Retryable for StoreCallError<E> {
    fn is_transient(&self) -> bool {
        match self {
            StoreCallError::Store(e) => e.is_transient(),
            StoreCallError::Poisoned => false,
        }
    }
}

/// Maps records onto rows and applies the per-key write policy
///
/// A key without a row is written once a record is accepted. A key with a
/// row is skipped before any work unless `overwrite_existing` is set, in
/// which case an accepted record replaces the row and a rejected one leaves
/// it untouched.
pub struct PersistenceCoordinator<S>
where
    S: RowStore,
{
    store: Arc<Mutex<S>>,
    layout: Arc<TableLayout>,
    overwrite_existing: bool,
    retry: RetryPolicy,
}

impl<S> PersistenceCoordinator<S>
where
    S: RowStore + Send + 'static,
    S::Error: Retryable + fmt::Display + Send + 'static,
{
    /// Create a coordinator writing `layout` rows into `store`
    pub fn new(
        store: Arc<Mutex<S>>,
        layout: TableLayout,
        overwrite_existing: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            layout: Arc::new(layout),
            overwrite_existing,
            retry,
        }
    }

    /// Destination table layout
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Whether existing rows are replaced
    pub fn overwrite_existing(&self) -> bool {
        self.overwrite_existing
    }

    /// Run one store call on the blocking pool, under the retry policy
    ///
    /// A call that outlives the attempt timeout is not retried: it may
    /// still complete, and a second upsert of the same key would then
    /// report an update for a fresh key.
    async fn call<T, F>(&self, operation: &str, f: F) -> Result<T, ExtractorError>
    where
        T: Send + 'static,
        F: Fn(&mut S, &TableLayout) -> Result<T, S::Error> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.retry
            .run_detached(operation, || {
                let store = Arc::clone(&self.store);
                let layout = Arc::clone(&self.layout);
                let f = Arc::clone(&f);
                run_blocking(move || {
                    let mut guard = store.lock().map_err(|_| StoreCallError::Poisoned)?;
                    f(&mut guard, &layout).map_err(StoreCallError::Store)
                })
            })
            .await
            .map_err(|e| ExtractorError::from_retry(e, ExtractorError::Persistence))
    }

    /// Create the destination table if absent
    pub async fn prepare(&self) -> Result<(), ExtractorError> {
        self.call("prepare table", |store, layout| store.prepare(layout))
            .await?;
        info!(table = self.layout.table(), "Table ready");
        Ok(())
    }

    /// Drop and recreate the destination table
    pub async fn reset(&self) -> Result<(), ExtractorError> {
        self.call("reset table", |store, layout| store.reset(layout))
            .await?;
        info!(table = self.layout.table(), "Table reset");
        Ok(())
    }

    /// Decide what to do with `key` before any retrieval
    pub async fn decide(&self, key: &RowKey) -> Result<KeyDecision, ExtractorError> {
        let owned = key.clone();
        let exists = self
            .call("exists", move |store, layout| store.exists(layout, &owned))
            .await?;

        let decision = match (exists, self.overwrite_existing) {
            (true, false) => KeyDecision::Skip,
            (existing, _) => KeyDecision::Process { existing },
        };
        debug!(key = %key, ?decision, "Key decision");
        Ok(decision)
    }

    /// Read back the row stored for `key`
    pub async fn fetch(&self, key: &RowKey) -> Result<Option<TableRow>, ExtractorError> {
        let owned = key.clone();
        self.call("fetch", move |store, layout| store.fetch(layout, &owned))
            .await
    }

    /// Map an accepted record onto a row of the layout
    pub fn to_row(
        &self,
        record: &ExtractionRecord,
        article: &Article,
        ranked: &[RankedSection],
    ) -> TableRow {
        build_row(&self.layout, record, article, ranked)
    }

    /// Write an accepted record
    pub async fn write(
        &self,
        record: &ExtractionRecord,
        article: &Article,
        ranked: &[RankedSection],
    ) -> Result<WriteOutcome, ExtractorError> {
        let key = record.key();
        let row = self.to_row(record, article, ranked);
        let owned_key = key.clone();

        let ack = self
            .call("upsert", move |store, layout| store.upsert(layout, &owned_key, &row))
            .await?;

        let outcome = match ack {
            UpsertAck::Inserted => WriteOutcome::Inserted,
            UpsertAck::Updated => WriteOutcome::Replaced,
        };
        info!(key = %key, ?outcome, "Row written");
        Ok(outcome)
    }
}

fn build_row(
    layout: &TableLayout,
    record: &ExtractionRecord,
    article: &Article,
    ranked: &[RankedSection],
) -> TableRow {
    let mut row = TableRow::new();
    for column in layout.columns() {
        let value = match column.role {
            ColumnRole::Metadata(MetadataColumn::PubmedId) => {
                ColumnValue::Text(article.id().to_string())
            }
            ColumnRole::Metadata(MetadataColumn::Format) => {
                ColumnValue::Text(article.format().as_str().to_string())
            }
            ColumnRole::Metadata(MetadataColumn::Sections) => {
                ColumnValue::Json(sections_json(record, article, ranked))
            }
            ColumnRole::Input => record
                .binding()
                .get(&column.name)
                .map(|v| ColumnValue::Text(v.name.clone()))
                .unwrap_or(ColumnValue::Null),
            ColumnRole::Output => output_cell(record.value(&column.name)),
        };
        row.push(column.name.clone(), value);
    }
    row
}

fn output_cell(value: &Extracted) -> ColumnValue {
    match value {
        Extracted::Absent => ColumnValue::Null,
        Extracted::Multiple(_) => ColumnValue::Json(value.to_json()),
        Extracted::Single(FieldValue::Text(s)) => ColumnValue::Text(s.clone()),
        Extracted::Single(FieldValue::Integer(i)) => ColumnValue::Integer(*i),
        Extracted::Single(FieldValue::Decimal(f)) => ColumnValue::Real(*f),
        Extracted::Single(FieldValue::Boolean(b)) => ColumnValue::Boolean(*b),
        Extracted::Single(FieldValue::Object(map)) => ColumnValue::Json(Value::Object(map.clone())),
    }
}

/// `section_<n> -> {heading, text, cited_by}` for the sections shown to the model
fn sections_json(record: &ExtractionRecord, article: &Article, ranked: &[RankedSection]) -> Value {
    let cited = record.cited_sections();
    let mut sections = Map::new();
    for ranked in ranked {
        let Some(section) = article.section(ranked.id) else {
            continue;
        };
        let cited_by = cited.get(&ranked.id).cloned().unwrap_or_default();
        sections.insert(
            ranked.id.label(),
            json!({
                "heading": section.heading,
                "text": section.text,
                "cited_by": cited_by,
            }),
        );
    }
    Value::Object(sections)
}
