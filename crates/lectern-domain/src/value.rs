//! Extracted values and validated extraction records

use crate::article::SectionId;
use crate::row::RowKey;
use crate::schema::{Binding, DataType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single typed value, one variant per [`DataType`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text (after allowed-value resolution, the canonical name)
    Text(String),
    /// Whole number
    Integer(i64),
    /// Real number
    Decimal(f64),
    /// Boolean
    Boolean(bool),
    /// JSON object
    Object(Map<String, Value>),
}

impl FieldValue {
    /// Data type this value belongs to
    pub fn data_type(&self) -> DataType {
        match self {
            FieldValue::Text(_) => DataType::Text,
            FieldValue::Integer(_) => DataType::Integer,
            FieldValue::Decimal(_) => DataType::Decimal,
            FieldValue::Boolean(_) => DataType::Boolean,
            FieldValue::Object(_) => DataType::Object,
        }
    }

    /// JSON form of the value
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Decimal(f) => Value::from(*f),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Object(map) => Value::Object(map.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Outcome of extracting one feature
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// No value (optional feature missing or dropped)
    Absent,
    /// Single-valued feature
    Single(FieldValue),
    /// Multi-valued feature, in reply order
    Multiple(Vec<FieldValue>),
}

impl Extracted {
    /// True when no value was extracted
    pub fn is_absent(&self) -> bool {
        matches!(self, Extracted::Absent)
    }

    /// JSON form: `null`, the value, or an array
    pub fn to_json(&self) -> Value {
        match self {
            Extracted::Absent => Value::Null,
            Extracted::Single(v) => v.to_json(),
            Extracted::Multiple(values) => Value::Array(values.iter().map(FieldValue::to_json).collect()),
        }
    }
}

/// A feature's value together with the sections cited for it
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedField {
    /// Feature name
    pub name: String,
    /// Extracted value
    pub value: Extracted,
    /// Sections the model cited as evidence
    pub citations: Vec<SectionId>,
}

/// A non-fatal problem noticed while validating a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    /// Feature name
    pub field: String,
    /// What happened
    pub message: String,
}

impl FieldWarning {
    /// Create a warning
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A validated extraction for one (binding, article) pair
///
/// Produced only by the extractor once validation has passed; there is no way
/// to change it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    binding: Binding,
    article_id: String,
    fields: Vec<ExtractedField>,
    warnings: Vec<FieldWarning>,
}

impl ExtractionRecord {
    /// Assemble a record; `fields` follow the schema's feature order
    pub fn new(
        binding: Binding,
        article_id: impl Into<String>,
        fields: Vec<ExtractedField>,
        warnings: Vec<FieldWarning>,
    ) -> Self {
        Self {
            binding,
            article_id: article_id.into(),
            fields,
            warnings,
        }
    }

    /// Input binding the record answers
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Article the record was extracted from
    pub fn article_id(&self) -> &str {
        &self.article_id
    }

    /// Extracted fields in schema order
    pub fn fields(&self) -> &[ExtractedField] {
        &self.fields
    }

    /// Look up a field by feature name
    pub fn field(&self, name: &str) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Value of a feature, `Absent` when unknown
    pub fn value(&self, name: &str) -> &Extracted {
        self.field(name).map(|f| &f.value).unwrap_or(&Extracted::Absent)
    }

    /// Validation warnings
    pub fn warnings(&self) -> &[FieldWarning] {
        &self.warnings
    }

    /// Row key of the record
    pub fn key(&self) -> RowKey {
        self.binding.key(&self.article_id)
    }

    /// Cited sections mapped to the features citing them
    pub fn cited_sections(&self) -> BTreeMap<SectionId, Vec<String>> {
        let mut cited: BTreeMap<SectionId, Vec<String>> = BTreeMap::new();
        for field in &self.fields {
            for id in &field.citations {
                let names = cited.entry(*id).or_default();
                if !names.contains(&field.name) {
                    names.push(field.name.clone());
                }
            }
        }
        cited
    }
}
