//! Integration tests for lectern-store
//!
//! These tests verify the prepare / upsert / fetch cycle against both stores.

use lectern_domain::{
    ColumnValue, DataType, InputParameter, InputValue, MetadataColumn, OutputFeature, RowKey,
    RowStore, Schema, SchemaDefinition, TableLayout, TableRow, UpsertAck,
};
use lectern_store::{MemoryRowStore, SqliteRowStore, StoreError};
use serde_json::json;

fn feature(name: &str, data_type: DataType, multiple: bool) -> OutputFeature {
    OutputFeature {
        name: name.to_string(),
        description: String::new(),
        data_type,
        required: false,
        multiple_values: multiple,
        max_length: None,
        allowed_values: None,
    }
}

fn layout() -> TableLayout {
    let schema = Schema::new(SchemaDefinition {
        research_goal: "potency of channel blockers".to_string(),
        research_question: "What is the IC50 of {drug}?".to_string(),
        information_to_exclude: String::new(),
        input_parameters: vec![InputParameter {
            name: "drug".to_string(),
            description: String::new(),
            max_length: 20,
            values: vec![InputValue::named("TTX"), InputValue::named("lidocaine")],
        }],
        output_features: vec![
            feature("ic50", DataType::Decimal, false),
            feature("n_cells", DataType::Integer, false),
            feature("blocked", DataType::Boolean, false),
            feature("species", DataType::Text, true),
            feature("model", DataType::Text, false),
        ],
        examples: vec![],
    })
    .unwrap();

    TableLayout::new(
        "screening",
        &schema,
        &[MetadataColumn::PubmedId, MetadataColumn::Format, MetadataColumn::Sections],
    )
    .unwrap()
}

fn key(drug: &str, pmid: &str) -> RowKey {
    RowKey::new(vec![drug.to_string()], pmid)
}

fn row(ic50: f64) -> TableRow {
    let mut row = TableRow::new();
    row.push("format", ColumnValue::Text("PUBMED".to_string()));
    row.push(
        "sections",
        ColumnValue::Json(json!({"section_1": {"heading": "Abstract", "text": "...", "cited_by": ["ic50"]}})),
    );
    row.push("ic50", ColumnValue::Real(ic50));
    row.push("n_cells", ColumnValue::Integer(12));
    row.push("blocked", ColumnValue::Boolean(true));
    row.push("species", ColumnValue::Json(json!(["human", "mouse"])));
    row.push("model", ColumnValue::Null);
    row
}

fn exercise_store<S>(store: &mut S)
where
    S: RowStore<Error = StoreError>,
{
    let layout = layout();
    store.prepare(&layout).unwrap();

    let k = key("TTX", "PMID123");
    assert!(!store.exists(&layout, &k).unwrap());

    assert_eq!(store.upsert(&layout, &k, &row(2.5)).unwrap(), UpsertAck::Inserted);
    assert!(store.exists(&layout, &k).unwrap());
    assert!(!store.exists(&layout, &key("lidocaine", "PMID123")).unwrap());

    let fetched = store.fetch(&layout, &k).unwrap().unwrap();
    assert_eq!(fetched.get("pubmed_id"), Some(&ColumnValue::Text("PMID123".to_string())));
    assert_eq!(fetched.get("drug"), Some(&ColumnValue::Text("TTX".to_string())));
    assert_eq!(fetched.get("ic50"), Some(&ColumnValue::Real(2.5)));
    assert_eq!(fetched.get("n_cells"), Some(&ColumnValue::Integer(12)));
    assert_eq!(fetched.get("blocked"), Some(&ColumnValue::Boolean(true)));
    assert_eq!(fetched.get("species"), Some(&ColumnValue::Json(json!(["human", "mouse"]))));
    assert_eq!(fetched.get("model"), Some(&ColumnValue::Null));

    assert_eq!(store.upsert(&layout, &k, &row(3.0)).unwrap(), UpsertAck::Updated);
    let replaced = store.fetch(&layout, &k).unwrap().unwrap();
    assert_eq!(replaced.get("ic50"), Some(&ColumnValue::Real(3.0)));

    store.upsert(&layout, &key("lidocaine", "PMID123"), &row(200.0)).unwrap();
    assert!(store.fetch(&layout, &key("lidocaine", "PMID999")).unwrap().is_none());

    store.reset(&layout).unwrap();
    assert!(!store.exists(&layout, &k).unwrap());
}

#[test]
fn test_sqlite_store_cycle() {
    let mut store = SqliteRowStore::new(":memory:").unwrap();
    exercise_store(&mut store);
}

#[test]
fn test_memory_store_cycle() {
    let mut store = MemoryRowStore::new();
    exercise_store(&mut store);
}

#[test]
fn test_sqlite_rows_are_unique_per_key() {
    let layout = layout();
    let mut store = SqliteRowStore::new(":memory:").unwrap();
    store.prepare(&layout).unwrap();

    for _ in 0..3 {
        store.upsert(&layout, &key("TTX", "PMID1"), &row(1.0)).unwrap();
    }
    store.upsert(&layout, &key("TTX", "PMID2"), &row(1.0)).unwrap();
    assert_eq!(store.count(&layout).unwrap(), 2);
}

#[test]
fn test_sqlite_prepare_is_idempotent() {
    let layout = layout();
    let mut store = SqliteRowStore::new(":memory:").unwrap();
    store.prepare(&layout).unwrap();
    store.upsert(&layout, &key("TTX", "PMID1"), &row(1.0)).unwrap();
    store.prepare(&layout).unwrap();
    assert_eq!(store.count(&layout).unwrap(), 1);
}

#[test]
fn test_sqlite_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("screening.db");
    let layout = layout();

    {
        let mut store = SqliteRowStore::new(&path).unwrap();
        store.prepare(&layout).unwrap();
        store.upsert(&layout, &key("TTX", "PMID1"), &row(4.2)).unwrap();
    }

    let store = SqliteRowStore::new(&path).unwrap();
    let fetched = store.fetch(&layout, &key("TTX", "PMID1")).unwrap().unwrap();
    assert_eq!(fetched.get("ic50"), Some(&ColumnValue::Real(4.2)));
}

#[test]
fn test_create_table_sql() {
    let sql = SqliteRowStore::create_table_sql(&layout());
    assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"screening\""));
    assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
    assert!(sql.contains("\"pubmed_id\" VARCHAR(10) NOT NULL"));
    assert!(sql.contains("\"species\" JSON"));
    assert!(sql.contains("UNIQUE (\"drug\", \"pubmed_id\")"));
}

#[test]
fn test_unknown_column_rejected() {
    let layout = layout();
    let mut store = MemoryRowStore::new();
    store.prepare(&layout).unwrap();

    let mut bad = TableRow::new();
    bad.push("potency", ColumnValue::Real(1.0));
    let err = store.upsert(&layout, &key("TTX", "1"), &bad).unwrap_err();
    assert!(matches!(err, StoreError::UnknownColumn { .. }));
}

#[test]
fn test_memory_store_requires_prepare() {
    let store = MemoryRowStore::new();
    let err = store.exists(&layout(), &key("TTX", "1")).unwrap_err();
    assert!(matches!(err, StoreError::NotPrepared(_)));
}

#[test]
fn test_key_arity_mismatch() {
    let layout = layout();
    let mut store = SqliteRowStore::new(":memory:").unwrap();
    store.prepare(&layout).unwrap();
    let bad_key = RowKey::new(vec!["TTX".to_string(), "Nav1.7".to_string()], "1");
    assert!(matches!(
        store.upsert(&layout, &bad_key, &TableRow::new()),
        Err(StoreError::InvalidData(_))
    ));
}
