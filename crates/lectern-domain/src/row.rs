//! Destination table layout and rows
//!
//! The column layout is the on-disk format: metadata columns first, then one
//! column per input parameter, then one per output feature. Rows are keyed by
//! the input columns plus `pubmed_id`.

use crate::schema::{DataType, Schema, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Compound existence key of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Bound input value names, in parameter order
    pub input_values: Vec<String>,
    /// Article identifier
    pub article_id: String,
}

impl RowKey {
    /// Create a key
    pub fn new(input_values: Vec<String>, article_id: impl Into<String>) -> Self {
        Self {
            input_values,
            article_id: article_id.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.input_values.join(", "), self.article_id)
    }
}

/// A cell value
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL
    Null,
    /// Text
    Text(String),
    /// Integer
    Integer(i64),
    /// Floating point
    Real(f64),
    /// Boolean
    Boolean(bool),
    /// JSON document, stored as text
    Json(Value),
}

impl ColumnValue {
    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Text content, if this is a text cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Declared SQL type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// `JSON`
    Json,
    /// `LONGTEXT`
    LongText,
    /// `TINYTEXT`
    TinyText,
    /// `VARCHAR(n)`
    Varchar(u32),
    /// `BOOL`
    Bool,
    /// `INT`
    Int,
    /// `FLOAT`
    Float,
}

impl ColumnType {
    /// Text type for an optional length bound
    ///
    /// ```
    /// use lectern_domain::ColumnType;
    ///
    /// assert_eq!(ColumnType::for_text(Some(10)), ColumnType::Varchar(10));
    /// assert_eq!(ColumnType::for_text(Some(100)), ColumnType::TinyText);
    /// assert_eq!(ColumnType::for_text(None), ColumnType::LongText);
    /// ```
    pub fn for_text(max_length: Option<u32>) -> Self {
        match max_length {
            None => ColumnType::LongText,
            Some(n) if n > 255 => ColumnType::LongText,
            Some(n) if n < 30 => ColumnType::Varchar(n),
            Some(_) => ColumnType::TinyText,
        }
    }

    /// SQL spelling of the type
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Json => "JSON".to_string(),
            ColumnType::LongText => "LONGTEXT".to_string(),
            ColumnType::TinyText => "TINYTEXT".to_string(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Bool => "BOOL".to_string(),
            ColumnType::Int => "INT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Optional bookkeeping columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataColumn {
    /// Article identifier, part of the key
    PubmedId,
    /// Article format (`PMC`, `PUBMED`, `PUBMED | PDF`)
    Format,
    /// Ranked sections with the features citing them
    Sections,
}

impl MetadataColumn {
    /// Column name
    pub fn name(&self) -> &'static str {
        match self {
            MetadataColumn::PubmedId => "pubmed_id",
            MetadataColumn::Format => "format",
            MetadataColumn::Sections => "sections",
        }
    }

    /// Declared type
    pub fn column_type(&self) -> ColumnType {
        match self {
            MetadataColumn::PubmedId => ColumnType::Varchar(10),
            MetadataColumn::Format => ColumnType::Varchar(15),
            MetadataColumn::Sections => ColumnType::Json,
        }
    }
}

/// What a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Bookkeeping column
    Metadata(MetadataColumn),
    /// Bound input value name
    Input,
    /// Extracted feature
    Output,
}

/// One column of the layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// What the column holds
    pub role: ColumnRole,
    /// Whether the column is part of the compound key
    pub key: bool,
}

/// Column layout of the destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    table: String,
    columns: Vec<ColumnDef>,
}

impl TableLayout {
    /// Derive the layout for a schema
    ///
    /// `metadata` must start with `pubmed_id` and must not repeat a column.
    pub fn new(
        table: impl Into<String>,
        schema: &Schema,
        metadata: &[MetadataColumn],
    ) -> Result<Self, SchemaError> {
        let table = table.into();
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SchemaError::InvalidIdentifier(table));
        }
        if metadata.first() != Some(&MetadataColumn::PubmedId) {
            return Err(SchemaError::MetadataOrder);
        }

        let mut columns = Vec::new();
        for (i, column) in metadata.iter().enumerate() {
            if metadata[..i].contains(column) {
                return Err(SchemaError::DuplicateColumn(column.name().to_string()));
            }
            columns.push(ColumnDef {
                name: column.name().to_string(),
                column_type: column.column_type(),
                role: ColumnRole::Metadata(*column),
                key: *column == MetadataColumn::PubmedId,
            });
        }

        for parameter in schema.input_parameters() {
            columns.push(ColumnDef {
                name: parameter.name.clone(),
                column_type: ColumnType::for_text(Some(parameter.max_length)),
                role: ColumnRole::Input,
                key: true,
            });
        }

        for feature in schema.output_features() {
            let column_type = if feature.multiple_values {
                ColumnType::Json
            } else {
                match feature.data_type {
                    DataType::Text => ColumnType::for_text(feature.max_length),
                    DataType::Integer => ColumnType::Int,
                    DataType::Decimal => ColumnType::Float,
                    DataType::Boolean => ColumnType::Bool,
                    DataType::Object => ColumnType::Json,
                }
            };
            columns.push(ColumnDef {
                name: feature.name.clone(),
                column_type,
                role: ColumnRole::Output,
                key: false,
            });
        }

        Ok(Self { table, columns })
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in layout order
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Look up a column
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a metadata column is configured
    pub fn has_metadata(&self, column: MetadataColumn) -> bool {
        self.columns
            .iter()
            .any(|c| c.role == ColumnRole::Metadata(column))
    }

    /// Key column names: input columns, then `pubmed_id`
    pub fn key_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.role == ColumnRole::Input)
            .map(|c| c.name.as_str())
            .collect();
        names.push(MetadataColumn::PubmedId.name());
        names
    }

    /// Key columns paired with their values for `key`
    pub fn key_pairs<'a>(&'a self, key: &'a RowKey) -> Vec<(&'a str, &'a str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .columns
            .iter()
            .filter(|c| c.role == ColumnRole::Input)
            .map(|c| c.name.as_str())
            .zip(key.input_values.iter().map(String::as_str))
            .collect();
        pairs.push((MetadataColumn::PubmedId.name(), key.article_id.as_str()));
        pairs
    }
}

/// One row, with cells in layout order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    cells: Vec<(String, ColumnValue)>,
}

impl TableRow {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cell
    pub fn push(&mut self, column: impl Into<String>, value: ColumnValue) {
        self.cells.push((column.into(), value));
    }

    /// Cell value by column name
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.cells.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// Cells in order
    pub fn cells(&self) -> &[(String, ColumnValue)] {
        &self.cells
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the row has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        DataType, InputParameter, InputValue, OutputFeature, SchemaDefinition,
    };

    fn feature(name: &str, data_type: DataType, multiple: bool, max_length: Option<u32>) -> OutputFeature {
        OutputFeature {
            name: name.to_string(),
            description: String::new(),
            data_type,
            required: true,
            multiple_values: multiple,
            max_length,
            allowed_values: None,
        }
    }

    fn schema() -> Schema {
        Schema::new(SchemaDefinition {
            research_goal: "potency".to_string(),
            research_question: "IC50 of {drug}?".to_string(),
            information_to_exclude: String::new(),
            input_parameters: vec![InputParameter {
                name: "drug".to_string(),
                description: String::new(),
                max_length: 20,
                values: vec![InputValue::named("TTX")],
            }],
            output_features: vec![
                feature("ic50", DataType::Decimal, false, None),
                feature("n_cells", DataType::Integer, false, None),
                feature("blocked", DataType::Boolean, false, None),
                feature("species", DataType::Text, true, Some(10)),
                feature("notes", DataType::Text, false, Some(100)),
                feature("summary", DataType::Text, false, None),
                feature("conditions", DataType::Object, false, None),
            ],
            examples: vec![],
        })
        .unwrap()
    }

    #[test]
    fn test_layout_order_and_types() {
        let layout = TableLayout::new(
            "screening",
            &schema(),
            &[MetadataColumn::PubmedId, MetadataColumn::Format, MetadataColumn::Sections],
        )
        .unwrap();

        let described: Vec<(String, String)> = layout
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.column_type.sql()))
            .collect();
        let expected = [
            ("pubmed_id", "VARCHAR(10)"),
            ("format", "VARCHAR(15)"),
            ("sections", "JSON"),
            ("drug", "VARCHAR(20)"),
            ("ic50", "FLOAT"),
            ("n_cells", "INT"),
            ("blocked", "BOOL"),
            ("species", "JSON"),
            ("notes", "TINYTEXT"),
            ("summary", "LONGTEXT"),
            ("conditions", "JSON"),
        ];
        assert_eq!(described.len(), expected.len());
        for ((name, ty), (en, et)) in described.iter().zip(expected.iter()) {
            assert_eq!(name, en);
            assert_eq!(ty, et);
        }
        assert_eq!(layout.key_columns(), vec!["drug", "pubmed_id"]);
    }

    #[test]
    fn test_metadata_must_start_with_pubmed_id() {
        let err = TableLayout::new("t", &schema(), &[MetadataColumn::Format]).unwrap_err();
        assert_eq!(err, SchemaError::MetadataOrder);
        assert!(TableLayout::new("t", &schema(), &[]).is_err());
        assert!(TableLayout::new(
            "t",
            &schema(),
            &[MetadataColumn::PubmedId, MetadataColumn::PubmedId]
        )
        .is_err());
        assert!(TableLayout::new("bad name", &schema(), &[MetadataColumn::PubmedId]).is_err());
    }

    #[test]
    fn test_key_pairs() {
        let layout = TableLayout::new("t", &schema(), &[MetadataColumn::PubmedId]).unwrap();
        let key = RowKey::new(vec!["TTX".to_string()], "PMID123");
        assert_eq!(
            layout.key_pairs(&key),
            vec![("drug", "TTX"), ("pubmed_id", "PMID123")]
        );
        assert!(!layout.has_metadata(MetadataColumn::Sections));
    }

    #[test]
    fn test_text_type_boundaries() {
        assert_eq!(ColumnType::for_text(Some(29)), ColumnType::Varchar(29));
        assert_eq!(ColumnType::for_text(Some(30)), ColumnType::TinyText);
        assert_eq!(ColumnType::for_text(Some(255)), ColumnType::TinyText);
        assert_eq!(ColumnType::for_text(Some(256)), ColumnType::LongText);
    }
}
