//! Parse model replies into per-feature entries

use crate::error::ExtractorError;
use lectern_domain::{DataType, Schema};
use serde_json::{Map, Value};

/// One feature entry of a reply, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyField {
    /// Raw value as the model wrote it
    pub value: Value,
    /// Citation labels as the model wrote them
    pub citations: Vec<String>,
}

/// A parsed reply: feature name to entry, in reply order
pub type Reply = Vec<(String, ReplyField)>;

/// Parse a model reply
///
/// The reply must contain a JSON object, optionally wrapped in a markdown
/// code block or surrounded by prose. Each entry is either
/// `{"value": ..., "citations": [...]}` or a bare value. For object
/// features the `citations` key must be present for an entry to count as
/// a wrapper, so a bare object with a lone `value` key stays intact.
pub fn parse_reply(response: &str, schema: &Schema) -> Result<Reply, ExtractorError> {
    let json_str = extract_json(response)?;
    let json: Value = serde_json::from_str(json_str)
        .map_err(|e| ExtractorError::InvalidFormat(format!("JSON parse error: {}", e)))?;

    let object = match json {
        Value::Object(map) => map,
        _ => {
            return Err(ExtractorError::InvalidFormat(
                "Expected JSON object".to_string(),
            ))
        }
    };

    Ok(object
        .into_iter()
        .map(|(name, entry)| {
            let object_typed = schema
                .feature(&name)
                .is_some_and(|f| f.data_type == DataType::Object);
            let entry = parse_entry(entry, object_typed);
            (name, entry)
        })
        .collect())
}

/// Extract the JSON object text, handling markdown code blocks
fn extract_json(response: &str) -> Result<&str, ExtractorError> {
    let trimmed = response.trim();

    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the fence line (```json or ```) and the closing fence
        let after_fence = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        after_fence
            .rsplit_once("```")
            .map(|(body, _)| body)
            .unwrap_or(after_fence)
            .trim()
    } else {
        trimmed
    };

    if body.is_empty() {
        return Err(ExtractorError::InvalidFormat("Empty reply".to_string()));
    }

    // Prose around the object: keep the outermost braces
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&body[start..=end]),
        _ => Ok(body),
    }
}

fn parse_entry(entry: Value, object_typed: bool) -> ReplyField {
    match entry {
        Value::Object(mut map)
            if is_wrapper(&map) && (!object_typed || map.contains_key("citations")) =>
        {
            let value = map.remove("value").unwrap_or(Value::Null);
            let citations = map
                .remove("citations")
                .map(citation_labels)
                .unwrap_or_default();
            ReplyField { value, citations }
        }
        value => ReplyField {
            value,
            citations: Vec::new(),
        },
    }
}

/// `{"value": ...}` with at most a `citations` key besides
fn is_wrapper(map: &Map<String, Value>) -> bool {
    map.contains_key("value") && map.keys().all(|k| k == "value" || k == "citations")
}

fn citation_labels(citations: Value) -> Vec<String> {
    let items = match citations {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Number(n) => n.as_u64().map(|n| format!("section_{}", n)),
            _ => None,
        })
        .collect()
}
