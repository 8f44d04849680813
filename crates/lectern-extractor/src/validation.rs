//! Validate parsed replies against the schema

use crate::config::SingleValueOverflow;
use crate::error::ExtractorError;
use crate::parser::{Reply, ReplyField};
use lectern_domain::{
    Binding, DataType, Extracted, ExtractedField, ExtractionRecord, FieldValue, FieldWarning,
    OutputFeature, Schema, SectionId,
};
use serde_json::Value;
use tracing::warn;

/// Turns a parsed reply into an [`ExtractionRecord`]
///
/// Any violation on a required feature rejects the whole record. Violations
/// on optional features leave the feature absent and add a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator {
    overflow: SingleValueOverflow,
}

impl RecordValidator {
    /// Create a validator with the given single-value overflow policy
    pub fn new(overflow: SingleValueOverflow) -> Self {
        Self { overflow }
    }

    /// Validate `reply` for `binding` and `article_id`
    ///
    /// `shown` lists the sections the prompt presented; citations of any other
    /// section are dropped with a warning.
    pub fn validate(
        &self,
        schema: &Schema,
        binding: &Binding,
        article_id: &str,
        mut reply: Reply,
        shown: &[SectionId],
    ) -> Result<ExtractionRecord, ExtractorError> {
        let mut fields = Vec::with_capacity(schema.output_features().len());
        let mut warnings = Vec::new();
        let mut failed = Vec::new();
        let mut details = Vec::new();

        for feature in schema.output_features() {
            let entry = take_entry(&mut reply, &feature.name);
            let (value, citations) = match entry {
                Some(ReplyField { value, citations }) => (value, citations),
                None => (Value::Null, Vec::new()),
            };

            let extracted = match self.extract(feature, value, &mut warnings) {
                Ok(extracted) => extracted,
                Err(violation) => {
                    if feature.required {
                        failed.push(feature.name.clone());
                        details.push(format!("{}: {}", feature.name, violation));
                    } else {
                        warnings.push(FieldWarning::new(&feature.name, violation));
                    }
                    Extracted::Absent
                }
            };

            let citations = if extracted.is_absent() {
                Vec::new()
            } else {
                resolve_citations(&feature.name, citations, shown, &mut warnings)
            };

            fields.push(ExtractedField {
                name: feature.name.clone(),
                value: extracted,
                citations,
            });
        }

        for (name, _) in reply {
            warnings.push(FieldWarning::new(name, "not a declared feature, ignored"));
        }

        if !failed.is_empty() {
            return Err(ExtractorError::Validation {
                fields: failed,
                details,
            });
        }

        for warning in &warnings {
            warn!(article_id, binding = %binding, "{}", warning);
        }

        Ok(ExtractionRecord::new(
            binding.clone(),
            article_id,
            fields,
            warnings,
        ))
    }

    fn extract(
        &self,
        feature: &OutputFeature,
        value: Value,
        warnings: &mut Vec<FieldWarning>,
    ) -> Result<Extracted, String> {
        if is_missing(&value) {
            return if feature.required {
                Err("missing".to_string())
            } else {
                Ok(Extracted::Absent)
            };
        }

        if feature.multiple_values {
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            let values = items
                .into_iter()
                .filter(|v| !is_missing(v))
                .map(|v| coerce(feature, v))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Extracted::Multiple(values));
        }

        let single = match value {
            Value::Array(mut items) => {
                items.retain(|v| !is_missing(v));
                if items.len() > 1 {
                    match self.overflow {
                        SingleValueOverflow::Reject => {
                            return Err(format!(
                                "expected a single value, got {}",
                                items.len()
                            ))
                        }
                        SingleValueOverflow::TakeFirst => warnings.push(FieldWarning::new(
                            &feature.name,
                            format!("{} values for a single-valued feature, kept the first", items.len()),
                        )),
                    }
                }
                // Non-empty: the whole array was checked by `is_missing`
                items.into_iter().next().unwrap_or(Value::Null)
            }
            single => single,
        };

        coerce(feature, single).map(Extracted::Single)
    }
}

/// Remove the entry for `name`, exact match first, then case-insensitive
fn take_entry(reply: &mut Reply, name: &str) -> Option<ReplyField> {
    let index = reply
        .iter()
        .position(|(key, _)| key == name)
        .or_else(|| reply.iter().position(|(key, _)| key.eq_ignore_ascii_case(name)))?;
    Some(reply.remove(index).1)
}

/// `null`, blank strings and lists of those count as no answer
fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_missing),
        _ => false,
    }
}

/// Coerce one JSON value to the feature's type and constraints
fn coerce(feature: &OutputFeature, value: Value) -> Result<FieldValue, String> {
    let typed = match feature.data_type {
        DataType::Text => coerce_text(value)?,
        DataType::Integer => coerce_integer(&value)?,
        DataType::Decimal => coerce_decimal(&value)?,
        DataType::Boolean => coerce_boolean(&value)?,
        DataType::Object => coerce_object(value)?,
    };

    let FieldValue::Text(text) = typed else {
        return Ok(typed);
    };

    let text = if feature.allowed_values.is_some() {
        feature
            .resolve_allowed(&text)
            .map(|allowed| allowed.name.clone())
            .ok_or_else(|| format!("'{}' is not an allowed value", text))?
    } else {
        text
    };

    if let Some(max) = feature.max_length {
        let length = text.chars().count();
        if length > max as usize {
            return Err(format!("{} characters exceeds max_length {}", length, max));
        }
    }
    Ok(FieldValue::Text(text))
}

fn mismatch(value: &Value, data_type: DataType) -> String {
    format!("cannot read {} as {}", value, data_type)
}

fn coerce_text(value: Value) -> Result<FieldValue, String> {
    match value {
        Value::String(s) => Ok(FieldValue::Text(s.trim().to_string())),
        Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
        Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
        other => Err(mismatch(&other, DataType::Text)),
    }
}

fn coerce_integer(value: &Value) -> Result<FieldValue, String> {
    let integral = |f: f64| {
        (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed
        .map(FieldValue::Integer)
        .ok_or_else(|| mismatch(value, DataType::Integer))
}

fn coerce_decimal(value: &Value) -> Result<FieldValue, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .map(FieldValue::Decimal)
        .ok_or_else(|| mismatch(value, DataType::Decimal))
}

fn coerce_boolean(value: &Value) -> Result<FieldValue, String> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(FieldValue::Boolean)
        .ok_or_else(|| mismatch(value, DataType::Boolean))
}

fn coerce_object(value: Value) -> Result<FieldValue, String> {
    match value {
        Value::Object(map) => Ok(FieldValue::Object(map)),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Ok(FieldValue::Object(map)),
            _ => Err(format!("cannot read \"{}\" as object", s)),
        },
        other => Err(mismatch(&other, DataType::Object)),
    }
}

fn resolve_citations(
    feature: &str,
    labels: Vec<String>,
    shown: &[SectionId],
    warnings: &mut Vec<FieldWarning>,
) -> Vec<SectionId> {
    let mut resolved = Vec::new();
    for label in labels {
        match SectionId::parse_label(&label) {
            Some(id) if shown.contains(&id) => {
                if !resolved.contains(&id) {
                    resolved.push(id);
                }
            }
            _ => warnings.push(FieldWarning::new(
                feature,
                format!("unknown citation '{}' dropped", label),
            )),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_reply;
    use lectern_domain::SchemaDefinition;
    use serde_json::json;

    const SCHEMA_TOML: &str = r#"
research_goal = "to collect potency measurements of sodium channel blockers"
research_question = "What is the IC50 of {drug}?"

[[input_parameters]]
name = "drug"
max_length = 20

[[input_parameters.values]]
name = "TTX"

[[output_features]]
name = "ic50"
data_type = "decimal"

[[output_features]]
name = "cell_line"
required = false
max_length = 8

[[output_features]]
name = "species"
required = false
multiple_values = true

[[output_features.allowed_values]]
name = "human"
alias = "homo_sapiens"

[[output_features.allowed_values]]
name = "mouse"

[[output_features]]
name = "use_dependent"
data_type = "boolean"
required = false

[[output_features]]
name = "n_cells"
data_type = "integer"
required = false
"#;

    fn schema() -> Schema {
        let def: SchemaDefinition = toml::from_str(SCHEMA_TOML).unwrap();
        Schema::new(def).unwrap()
    }

    fn shown() -> Vec<SectionId> {
        vec![SectionId::new(0), SectionId::new(2)]
    }

    fn validate(
        validator: RecordValidator,
        reply: &str,
    ) -> Result<ExtractionRecord, ExtractorError> {
        let schema = schema();
        let binding = schema.bindings().remove(0);
        validator.validate(&schema, &binding, "PMID123", parse_reply(reply, &schema).unwrap(), &shown())
    }

    #[test]
    fn test_valid_reply() {
        let record = validate(
            RecordValidator::default(),
            r#"{
                "ic50": {"value": "18.5", "citations": ["section_1"]},
                "cell_line": "HEK293",
                "species": {"value": ["Homo_Sapiens", "mouse"], "citations": ["section_3"]},
                "use_dependent": "no",
                "n_cells": 12.0
            }"#,
        )
        .unwrap();

        assert_eq!(record.value("ic50"), &Extracted::Single(FieldValue::Decimal(18.5)));
        assert_eq!(
            record.value("species"),
            &Extracted::Multiple(vec![
                FieldValue::Text("human".to_string()),
                FieldValue::Text("mouse".to_string())
            ])
        );
        assert_eq!(record.value("use_dependent"), &Extracted::Single(FieldValue::Boolean(false)));
        assert_eq!(record.value("n_cells"), &Extracted::Single(FieldValue::Integer(12)));
        assert_eq!(record.field("ic50").unwrap().citations, vec![SectionId::new(0)]);
        assert_eq!(record.field("species").unwrap().citations, vec![SectionId::new(2)]);
        assert!(record.warnings().is_empty());
        assert_eq!(record.key().article_id, "PMID123");
    }

    #[test]
    fn test_missing_required_rejects_record() {
        let err = validate(RecordValidator::default(), r#"{"cell_line": "HEK293"}"#).unwrap_err();
        assert_eq!(
            err,
            ExtractorError::Validation {
                fields: vec!["ic50".to_string()],
                details: vec!["ic50: missing".to_string()],
            }
        );
        assert!(err.is_rejection());
    }

    #[test]
    fn test_unknown_decimal_rejects_record() {
        let err = validate(RecordValidator::default(), r#"{"ic50": "unknown"}"#).unwrap_err();
        assert!(matches!(err, ExtractorError::Validation { ref fields, .. } if fields == &["ic50"]));
    }

    #[test]
    fn test_optional_violations_become_absent_with_warnings() {
        let record = validate(
            RecordValidator::default(),
            r#"{"ic50": 3, "cell_line": "far too long a name", "species": ["rat"], "use_dependent": "maybe"}"#,
        )
        .unwrap();
        assert!(record.value("cell_line").is_absent());
        assert!(record.value("species").is_absent());
        assert!(record.value("use_dependent").is_absent());
        assert!(record.value("n_cells").is_absent());
        let warned: Vec<&str> = record.warnings().iter().map(|w| w.field.as_str()).collect();
        assert_eq!(warned, vec!["cell_line", "species", "use_dependent"]);
    }

    #[test]
    fn test_allowed_value_must_resolve() {
        let record = validate(RecordValidator::default(), r#"{"ic50": 1, "species": "mus"}"#).unwrap();
        assert!(record.value("species").is_absent());
        assert!(record.warnings()[0].message.contains("not an allowed value"));
    }

    #[test]
    fn test_single_value_overflow_policies() {
        let reply = r#"{"ic50": [18, 20]}"#;
        let record = validate(RecordValidator::new(SingleValueOverflow::TakeFirst), reply).unwrap();
        assert_eq!(record.value("ic50"), &Extracted::Single(FieldValue::Decimal(18.0)));
        assert_eq!(record.warnings().len(), 1);

        let err = validate(RecordValidator::new(SingleValueOverflow::Reject), reply).unwrap_err();
        assert!(matches!(err, ExtractorError::Validation { .. }));
    }

    #[test]
    fn test_unknown_citations_dropped() {
        let record = validate(
            RecordValidator::default(),
            r#"{"ic50": {"value": 5, "citations": ["section_1", "section_2", "figure_1", "section_1"]}}"#,
        )
        .unwrap();
        assert_eq!(record.field("ic50").unwrap().citations, vec![SectionId::new(0)]);
        assert_eq!(record.warnings().len(), 2);
    }

    #[test]
    fn test_undeclared_keys_warn() {
        let record = validate(RecordValidator::default(), r#"{"IC50": 5, "notes": "x"}"#).unwrap();
        assert_eq!(record.value("ic50"), &Extracted::Single(FieldValue::Decimal(5.0)));
        assert_eq!(record.warnings(), &[FieldWarning::new("notes", "not a declared feature, ignored")]);
    }

    #[test]
    fn test_blank_values_are_missing() {
        assert!(validate(RecordValidator::default(), r#"{"ic50": ""}"#).is_err());
        assert!(validate(RecordValidator::default(), r#"{"ic50": [null, " "]}"#).is_err());
    }

    #[test]
    fn test_coercions() {
        let schema = schema();
        let feature = schema.feature("n_cells").unwrap();
        assert_eq!(coerce(feature, json!("7")), Ok(FieldValue::Integer(7)));
        assert!(coerce(feature, json!(7.5)).is_err());

        let mut object_feature = feature.clone();
        object_feature.data_type = DataType::Object;
        assert!(matches!(
            coerce(&object_feature, json!("{\"unit\": \"nM\"}")),
            Ok(FieldValue::Object(_))
        ));
        assert!(coerce(&object_feature, json!([1])).is_err());
    }
}
