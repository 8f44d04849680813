//! Prompt assembly for structured extraction

use crate::ranking::RankedSection;
use lectern_domain::{Article, Binding, Example, OutputFeature, RenderError, Schema, Section, SectionId};
use serde_json::{Map, Value};
use std::fmt::Write;
use std::sync::Arc;

const CONTEXT_NOTE: &str = "For your reasoning and answering keep in mind that some sections may contain syntax errors (symbols, math equations, formulas, abbreviations, punctuation marks etc.)";

/// Builds the prompt for one (binding, article) pair
///
/// The instructions, output format and worked examples depend only on the
/// schema and are rendered once. Output is byte-identical for identical
/// inputs.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    schema: Arc<Schema>,
    prefix: String,
}

impl PromptBuilder {
    /// Create a prompt builder for `schema`
    pub fn new(schema: Arc<Schema>) -> Result<Self, RenderError> {
        let mut prefix = String::new();
        push_instructions(&mut prefix, &schema);
        push_output_format(&mut prefix, schema.output_features());

        for example in schema.examples() {
            prefix.push('\n');
            push_example(&mut prefix, &schema, example)?;
        }

        Ok(Self { schema, prefix })
    }

    /// Build the complete extraction prompt
    ///
    /// `ranked` refers to sections of `article`; each is labelled with its
    /// position in the article so citations can be resolved.
    pub fn build(
        &self,
        binding: &Binding,
        article: &Article,
        ranked: &[RankedSection],
    ) -> Result<String, RenderError> {
        let mut prompt = self.prefix.clone();
        prompt.push('\n');

        // 1. The question
        let _ = writeln!(prompt, "QUESTION: {}", self.schema.format_question(binding)?);

        // 2. The ranked sections
        for ranked in ranked {
            if let Some(section) = article.section(ranked.id) {
                push_section(&mut prompt, ranked.id, section);
            }
        }

        // 3. The answer slot
        prompt.push_str("ANSWER:\n");
        Ok(prompt)
    }
}

fn push_instructions(out: &mut String, schema: &Schema) {
    let _ = write!(
        out,
        "Given the following extracted parts of a scientific paper. The goal is to generate a detailed summary in JSON format aiming {}.\n\
         Only respond when there is strong evidence that the paper reports thorough answer.",
        schema.research_goal()
    );
    let exclude = schema.information_to_exclude().trim();
    if !exclude.is_empty() {
        let _ = write!(out, " Do not report: {}.", exclude.trim_end_matches('.'));
    }
    out.push('\n');
    out.push_str(CONTEXT_NOTE);
    out.push_str("\n\n");
}

fn push_output_format(out: &mut String, features: &[OutputFeature]) {
    out.push_str("OUTPUT FORMAT\n");
    out.push_str(
        "Answer with a single JSON object. For every feature below add an entry \
         {\"value\": <value>, \"citations\": [\"section_<n>\", ...]} citing the sections that \
         support it. Use null as value when the paper does not report an optional feature. \
         Use a list of values for features that accept multiple values.\n",
    );

    for feature in features {
        let _ = write!(out, "- \"{}\"", feature.name);
        if !feature.description.is_empty() {
            let _ = write!(out, ": {}", feature.description);
        }
        out.push('\n');

        let _ = write!(
            out,
            "  type: {}; {}; {}",
            feature.data_type,
            if feature.required { "required" } else { "optional" },
            if feature.multiple_values {
                "multiple values"
            } else {
                "single value"
            }
        );
        if let Some(max) = feature.max_length {
            let _ = write!(out, "; at most {} characters", max);
        }
        out.push('\n');

        if let Some(allowed) = &feature.allowed_values {
            out.push_str("  allowed values:\n");
            for value in allowed {
                let _ = write!(out, "    \"{}\"", value.token());
                if value.token() != value.name {
                    let _ = write!(out, " ({})", value.name);
                }
                if !value.description.is_empty() {
                    let _ = write!(out, ": {}", value.description);
                }
                out.push('\n');
            }
        }
    }
}

fn push_example(out: &mut String, schema: &Schema, example: &Example) -> Result<(), RenderError> {
    let _ = writeln!(out, "QUESTION: {}", schema.example_question(example)?);
    for (index, section) in example.sections.iter().enumerate() {
        push_section(out, SectionId::new(index), section);
    }
    out.push_str("ANSWER:\n");
    out.push_str(&example_answer(&example.expected_output));
    out.push('\n');
    Ok(())
}

fn push_section(out: &mut String, id: SectionId, section: &Section) {
    if section.heading.is_empty() {
        let _ = writeln!(out, "[{}]", id);
    } else {
        let _ = writeln!(out, "[{}] {}", id, section.heading);
    }
    out.push_str(section.text.trim());
    out.push_str("\n\n");
}

/// Expected output in the reply shape, bare values wrapped
fn example_answer(expected: &Map<String, Value>) -> String {
    let normalized: Map<String, Value> = expected
        .iter()
        .map(|(name, entry)| {
            let wrapped = match entry {
                Value::Object(map) if map.contains_key("value") => {
                    let mut map = map.clone();
                    map.entry("citations").or_insert_with(|| Value::Array(Vec::new()));
                    Value::Object(map)
                }
                bare => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), bare.clone());
                    map.insert("citations".to_string(), Value::Array(Vec::new()));
                    Value::Object(map)
                }
            };
            (name.clone(), wrapped)
        })
        .collect();
    serde_json::to_string_pretty(&Value::Object(normalized)).unwrap_or_else(|_| "{}".to_string())
}
