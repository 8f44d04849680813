//! Schema model: input parameters, output features, allowed values and examples
//!
//! A [`Schema`] is built once from a configuration-declared
//! [`SchemaDefinition`] and is read-only afterwards. Construction checks every
//! invariant the rest of the pipeline relies on, so that rendering prompts and
//! mapping rows cannot fail later on for structural reasons.

use crate::article::Section;
use crate::row::RowKey;
use crate::template::{RenderError, Template, TemplateSyntaxError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Column names the row layout reserves for itself
pub const RESERVED_COLUMNS: &[&str] = &["id", "pubmed_id", "format", "sections"];

/// Errors detected while building a schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The research question could not be parsed
    #[error("Malformed research question: {0}")]
    MalformedTemplate(#[from] TemplateSyntaxError),

    /// A placeholder names no declared input parameter
    #[error("Placeholder '{{{0}}}' does not name a declared input parameter")]
    UnknownPlaceholder(String),

    /// No input parameters declared
    #[error("Schema declares no input parameters")]
    NoInputParameters,

    /// No output features declared
    #[error("Schema declares no output features")]
    NoOutputFeatures,

    /// Two columns (input parameters or output features) share a name
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// Two values of one input parameter share a name
    #[error("Input parameter '{parameter}' declares value '{value}' twice")]
    DuplicateInputValue {
        /// Parameter name
        parameter: String,
        /// Repeated value name
        value: String,
    },

    /// Two allowed values of one feature share a name, ignoring case
    #[error("Feature '{feature}' declares allowed value '{value}' twice")]
    DuplicateAllowedValue {
        /// Feature name
        feature: String,
        /// Repeated allowed value name
        value: String,
    },

    /// Two allowed values of one feature share an alias, ignoring case
    #[error("Feature '{feature}' declares allowed value alias '{alias}' twice")]
    DuplicateAllowedAlias {
        /// Feature name
        feature: String,
        /// Repeated alias
        alias: String,
    },

    /// A name cannot be used as a column
    #[error("'{0}' is not a valid column name (letters, digits and '_', not starting with a digit)")]
    InvalidIdentifier(String),

    /// A name collides with a metadata column
    #[error("Column name '{0}' is reserved")]
    ReservedName(String),

    /// A `max_length` of zero
    #[error("max_length of '{0}' must be positive")]
    NonPositiveMaxLength(String),

    /// An input parameter without values
    #[error("Input parameter '{0}' declares no values")]
    EmptyParameter(String),

    /// An input value with an empty name
    #[error("Input parameter '{0}' has a value with an empty name")]
    EmptyValueName(String),

    /// An input value longer than its parameter's `max_length`
    #[error("Value '{value}' of input parameter '{parameter}' is longer than max_length {max_length}")]
    ValueTooLong {
        /// Parameter name
        parameter: String,
        /// Offending value
        value: String,
        /// Declared bound
        max_length: u32,
    },

    /// An allowed value with an empty name
    #[error("Feature '{0}' has an allowed value with an empty name")]
    EmptyAllowedValue(String),

    /// `allowed_values` on a feature that is not text
    #[error("Feature '{feature}' declares allowed_values but has data type {data_type}")]
    AllowedValuesOnNonText {
        /// Feature name
        feature: String,
        /// Declared type
        data_type: DataType,
    },

    /// An example inconsistent with the schema
    #[error("Example {index}: {reason}")]
    InvalidExample {
        /// 0-based example index
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Metadata column list not starting with `pubmed_id`
    #[error("Metadata columns must start with 'pubmed_id'")]
    MetadataOrder,
}

/// Data type of an output feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Free text
    #[default]
    #[serde(alias = "str", alias = "string")]
    Text,
    /// Whole number
    #[serde(alias = "int")]
    Integer,
    /// Real number
    #[serde(alias = "float")]
    Decimal,
    /// true / false
    #[serde(alias = "bool")]
    Boolean,
    /// JSON object
    #[serde(alias = "dict", alias = "structured_object")]
    Object,
}

impl DataType {
    /// Lowercase name used in prompts and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One permitted value of an enumerated feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedValue {
    /// Canonical value stored in the table
    pub name: String,

    /// Token the model is asked to answer with
    #[serde(default)]
    pub alias: Option<String>,

    /// Meaning of the value, shown to the model
    #[serde(default)]
    pub description: String,
}

impl AllowedValue {
    /// Token shown to the model: the alias when set, otherwise the name
    pub fn token(&self) -> &str {
        match &self.alias {
            Some(alias) if !alias.trim().is_empty() => alias,
            _ => &self.name,
        }
    }
}

/// A feature the model is asked to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFeature {
    /// Column name
    pub name: String,

    /// What the feature means
    #[serde(default)]
    pub description: String,

    /// Expected value type
    #[serde(default)]
    pub data_type: DataType,

    /// Whether a record without this feature is rejected
    #[serde(default = "default_required")]
    pub required: bool,

    /// Whether the feature is a list of values
    #[serde(default)]
    pub multiple_values: bool,

    /// Maximum character length of text values
    #[serde(default)]
    pub max_length: Option<u32>,

    /// Closed set of permitted values
    #[serde(default)]
    pub allowed_values: Option<Vec<AllowedValue>>,
}

fn default_required() -> bool {
    true
}

impl OutputFeature {
    /// Resolve a model token against the allowed values
    ///
    /// Matching is case-insensitive, against aliases first and names second.
    /// Returns `None` when the feature has no allowed values or nothing matches.
    pub fn resolve_allowed(&self, token: &str) -> Option<&AllowedValue> {
        let allowed = self.allowed_values.as_ref()?;
        let needle = token.trim();
        allowed
            .iter()
            .find(|v| {
                v.alias
                    .as_deref()
                    .is_some_and(|alias| alias.trim().eq_ignore_ascii_case(needle))
            })
            .or_else(|| allowed.iter().find(|v| v.name.trim().eq_ignore_ascii_case(needle)))
    }
}

/// One value an input parameter can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputValue {
    /// Canonical name, stored in the input column
    pub name: String,

    /// Synonyms used to build retrieval queries
    #[serde(default, alias = "pubmed_alias")]
    pub search_aliases: Vec<String>,

    /// Synonyms the model may use for this value
    #[serde(default, alias = "llm_alias")]
    pub extraction_aliases: Vec<String>,
}

impl InputValue {
    /// A value without aliases
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            search_aliases: Vec::new(),
            extraction_aliases: Vec::new(),
        }
    }
}

/// A named dimension the research question is asked over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    /// Parameter name, used as placeholder and column name
    pub name: String,

    /// What the parameter means
    #[serde(default)]
    pub description: String,

    /// Upper bound on the length of any value name
    pub max_length: u32,

    /// Values, in iteration order
    pub values: Vec<InputValue>,
}

/// A worked example shown to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Input parameter name to the raw text bound in the question
    #[serde(alias = "input_parameters")]
    pub inputs: BTreeMap<String, String>,

    /// Mock article sections
    #[serde(default)]
    pub sections: Vec<Section>,

    /// Expected answer, keyed by feature name
    #[serde(alias = "output_features")]
    pub expected_output: Map<String, Value>,
}

/// A bound input parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundValue {
    /// Parameter name
    pub parameter: String,
    /// Value the parameter is bound to
    pub value: InputValue,
}

/// One combination of input values, one per input parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    values: Vec<BoundValue>,
}

impl Binding {
    /// Create a binding; order follows the schema's parameter order
    pub fn new(values: Vec<BoundValue>) -> Self {
        Self { values }
    }

    /// Bound values in parameter order
    pub fn values(&self) -> &[BoundValue] {
        &self.values
    }

    /// Value bound to `parameter`
    pub fn get(&self, parameter: &str) -> Option<&InputValue> {
        self.values
            .iter()
            .find(|b| b.parameter == parameter)
            .map(|b| &b.value)
    }

    /// Row key for this binding and an article
    pub fn key(&self, article_id: &str) -> RowKey {
        RowKey::new(
            self.values.iter().map(|b| b.value.name.clone()).collect(),
            article_id,
        )
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.values.iter().map(|b| b.value.name.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

/// Configuration form of a schema, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// What the screening aims at, completes "aiming ..." in the prompt
    pub research_goal: String,

    /// Question template with `{parameter}` placeholders
    pub research_question: String,

    /// Information the model should ignore
    #[serde(default)]
    pub information_to_exclude: String,

    /// Input parameters, in binding order
    pub input_parameters: Vec<InputParameter>,

    /// Output features, in column order
    pub output_features: Vec<OutputFeature>,

    /// Worked examples
    #[serde(default)]
    pub examples: Vec<Example>,
}

/// A validated, frozen schema
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    research_goal: String,
    question: Template,
    information_to_exclude: String,
    input_parameters: Vec<InputParameter>,
    output_features: Vec<OutputFeature>,
    examples: Vec<Example>,
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = SchemaError;

    fn try_from(definition: SchemaDefinition) -> Result<Self, Self::Error> {
        Schema::new(definition)
    }
}

impl Schema {
    /// Validate a definition and freeze it
    pub fn new(definition: SchemaDefinition) -> Result<Self, SchemaError> {
        let question = Template::parse(&definition.research_question)?;

        if definition.input_parameters.is_empty() {
            return Err(SchemaError::NoInputParameters);
        }
        if definition.output_features.is_empty() {
            return Err(SchemaError::NoOutputFeatures);
        }

        let mut columns = HashSet::new();
        for parameter in &definition.input_parameters {
            check_column_name(&parameter.name, &mut columns)?;
            check_parameter(parameter)?;
        }
        for feature in &definition.output_features {
            check_column_name(&feature.name, &mut columns)?;
            check_feature(feature)?;
        }

        let declared: HashSet<&str> = definition
            .input_parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        let placeholders = question.placeholders();
        for name in &placeholders {
            if !declared.contains(name) {
                return Err(SchemaError::UnknownPlaceholder(name.to_string()));
            }
        }

        let features: HashSet<&str> = definition
            .output_features
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        for (index, example) in definition.examples.iter().enumerate() {
            let invalid = |reason: String| SchemaError::InvalidExample { index, reason };
            if let Some(unknown) = example.inputs.keys().find(|k| !declared.contains(k.as_str())) {
                return Err(invalid(format!("unknown input parameter '{}'", unknown)));
            }
            if let Some(missing) = placeholders.iter().find(|p| !example.inputs.contains_key(**p)) {
                return Err(invalid(format!("no value for placeholder '{}'", missing)));
            }
            if let Some(unknown) = example
                .expected_output
                .keys()
                .find(|k| !features.contains(k.as_str()))
            {
                return Err(invalid(format!("unknown output feature '{}'", unknown)));
            }
        }

        Ok(Self {
            research_goal: definition.research_goal,
            question,
            information_to_exclude: definition.information_to_exclude,
            input_parameters: definition.input_parameters,
            output_features: definition.output_features,
            examples: definition.examples,
        })
    }

    /// Research goal
    pub fn research_goal(&self) -> &str {
        &self.research_goal
    }

    /// Parsed research question
    pub fn question(&self) -> &Template {
        &self.question
    }

    /// Information the model should ignore (may be empty)
    pub fn information_to_exclude(&self) -> &str {
        &self.information_to_exclude
    }

    /// Input parameters in declaration order
    pub fn input_parameters(&self) -> &[InputParameter] {
        &self.input_parameters
    }

    /// Output features in declaration order
    pub fn output_features(&self) -> &[OutputFeature] {
        &self.output_features
    }

    /// Look up an output feature by name
    pub fn feature(&self, name: &str) -> Option<&OutputFeature> {
        self.output_features.iter().find(|f| f.name == name)
    }

    /// Worked examples
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Every combination of input values
    ///
    /// The first parameter varies slowest, matching nested loops in
    /// declaration order.
    pub fn bindings(&self) -> Vec<Binding> {
        let mut combos: Vec<Vec<BoundValue>> = vec![Vec::new()];
        for parameter in &self.input_parameters {
            let mut next = Vec::with_capacity(combos.len() * parameter.values.len());
            for prefix in &combos {
                for value in &parameter.values {
                    let mut combo = prefix.clone();
                    combo.push(BoundValue {
                        parameter: parameter.name.clone(),
                        value: value.clone(),
                    });
                    next.push(combo);
                }
            }
            combos = next;
        }
        combos.into_iter().map(Binding::new).collect()
    }

    /// Question shown to the model
    ///
    /// Each placeholder becomes `name (a.k.a alias, ...)` when the value has
    /// extraction aliases, the bare name otherwise.
    pub fn format_question(&self, binding: &Binding) -> Result<String, RenderError> {
        self.question.render(|name| {
            binding.get(name).map(|value| {
                if value.extraction_aliases.is_empty() {
                    value.name.clone()
                } else {
                    format!("{} (a.k.a {})", value.name, value.extraction_aliases.join(", "))
                }
            })
        })
    }

    /// Question used to rank passages: every name and alias of the bound values
    pub fn ranking_query(&self, binding: &Binding) -> Result<String, RenderError> {
        self.question.render(|name| {
            binding.get(name).map(|value| {
                let mut terms: Vec<&str> = vec![value.name.as_str()];
                for alias in value.search_aliases.iter().chain(&value.extraction_aliases) {
                    if !terms.contains(&alias.as_str()) {
                        terms.push(alias);
                    }
                }
                terms.join(" ")
            })
        })
    }

    /// Boolean retrieval query, `(name OR alias ...) AND (...)`
    ///
    /// Terms holding whitespace, parentheses or a bare `AND`/`OR` are quoted
    /// as phrases.
    pub fn search_query(&self, binding: &Binding) -> String {
        binding
            .values()
            .iter()
            .map(|b| {
                let terms: Vec<String> = std::iter::once(&b.value.name)
                    .chain(&b.value.search_aliases)
                    .map(|term| search_term(term))
                    .filter(|term| !term.is_empty())
                    .collect();
                format!("({})", terms.join(" OR "))
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Question of a worked example, bound to its raw input texts
    pub fn example_question(&self, example: &Example) -> Result<String, RenderError> {
        self.question.render(|name| example.inputs.get(name).cloned())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_column_name(name: &str, seen: &mut HashSet<String>) -> Result<(), SchemaError> {
    if !is_identifier(name) {
        return Err(SchemaError::InvalidIdentifier(name.to_string()));
    }
    let lowered = name.to_ascii_lowercase();
    if RESERVED_COLUMNS.contains(&lowered.as_str()) {
        return Err(SchemaError::ReservedName(name.to_string()));
    }
    if !seen.insert(lowered) {
        return Err(SchemaError::DuplicateColumn(name.to_string()));
    }
    Ok(())
}

fn check_parameter(parameter: &InputParameter) -> Result<(), SchemaError> {
    if parameter.max_length == 0 {
        return Err(SchemaError::NonPositiveMaxLength(parameter.name.clone()));
    }
    if parameter.values.is_empty() {
        return Err(SchemaError::EmptyParameter(parameter.name.clone()));
    }
    let mut names = HashSet::new();
    for value in &parameter.values {
        if value.name.trim().is_empty() {
            return Err(SchemaError::EmptyValueName(parameter.name.clone()));
        }
        if value.name.chars().count() > parameter.max_length as usize {
            return Err(SchemaError::ValueTooLong {
                parameter: parameter.name.clone(),
                value: value.name.clone(),
                max_length: parameter.max_length,
            });
        }
        if !names.insert(value.name.as_str()) {
            return Err(SchemaError::DuplicateInputValue {
                parameter: parameter.name.clone(),
                value: value.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_feature(feature: &OutputFeature) -> Result<(), SchemaError> {
    if feature.max_length == Some(0) {
        return Err(SchemaError::NonPositiveMaxLength(feature.name.clone()));
    }
    if let Some(allowed) = &feature.allowed_values {
        if feature.data_type != DataType::Text {
            return Err(SchemaError::AllowedValuesOnNonText {
                feature: feature.name.clone(),
                data_type: feature.data_type,
            });
        }
        // Matching is case-insensitive, alias before name
        let mut names = HashSet::new();
        let mut aliases = HashSet::new();
        for value in allowed {
            if value.name.trim().is_empty() {
                return Err(SchemaError::EmptyAllowedValue(feature.name.clone()));
            }
            if !names.insert(value.name.trim().to_lowercase()) {
                return Err(SchemaError::DuplicateAllowedValue {
                    feature: feature.name.clone(),
                    value: value.name.clone(),
                });
            }
            if let Some(alias) = value.alias.as_deref() {
                if !aliases.insert(alias.trim().to_lowercase()) {
                    return Err(SchemaError::DuplicateAllowedAlias {
                        feature: feature.name.clone(),
                        alias: alias.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// One retrieval term; embedded quotes are dropped
fn search_term(term: &str) -> String {
    let term = term.replace('"', "");
    let term = term.trim();
    let plain = term != "OR"
        && term != "AND"
        && !term.chars().any(|c| c.is_whitespace() || c == '(' || c == ')');
    if plain || term.is_empty() {
        term.to_string()
    } else {
        format!("\"{}\"", term)
    }
}
