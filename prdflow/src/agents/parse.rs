//! Parsing model answers against a stage's output schema.

use crate::assembler::{parse_screens, ExecutionPlan};
use crate::core::StructuredOutput;
use crate::stages::{FieldKind, StageDefinition};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z]*\s*\n(.*?)```").expect("fence pattern is valid")
});

/// Extracts the JSON object from a model answer.
///
/// The object may be bare or wrapped in a Markdown code fence.
///
/// # Errors
///
/// Returns a description if no JSON object can be decoded.
pub fn extract_json(raw: &str) -> Result<Map<String, Value>, String> {
    let body = FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str())
        .trim();

    if body.is_empty() {
        return Err("empty response".to_string());
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind_name(&other))),
        Err(e) => Err(format!("response is not valid JSON: {e}")),
    }
}

/// Parses a model answer into the stage's structured output.
///
/// Only schema fields are kept; extra keys are ignored.
///
/// # Errors
///
/// Returns a description of the first missing or mistyped field.
pub fn parse_output(def: &StageDefinition, raw: &str) -> Result<StructuredOutput, String> {
    let mut object = extract_json(raw)?;
    let mut fields = BTreeMap::new();

    for field in def.output_schema {
        let value = object
            .remove(field.name)
            .ok_or_else(|| format!("missing field '{}'", field.name))?;
        check_kind(field.name, field.kind, &value)?;
        fields.insert(field.name.to_string(), value);
    }

    Ok(StructuredOutput::new(raw, fields))
}

fn check_kind(name: &str, kind: FieldKind, value: &Value) -> Result<(), String> {
    match kind {
        FieldKind::Text if value.is_null() => Err(format!("field '{name}' is null")),
        FieldKind::List if !value.is_array() => Err(format!(
            "field '{name}' must be a list, got {}",
            kind_name(value)
        )),
        FieldKind::Screens => parse_screens(value).map(|_| ()),
        FieldKind::Plan => ExecutionPlan::from_value(value).map(|_| ()),
        _ => Ok(()),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
