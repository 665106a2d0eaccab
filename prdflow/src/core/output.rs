//! Structured agent output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of one agent invocation.
///
/// `fields` is an ordered map so that anything derived from it (context
/// snapshots, rendered documents, archives) is independent of hash order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredOutput {
    /// The model's raw answer.
    pub raw: String,

    /// Parsed schema fields.
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl StructuredOutput {
    /// Creates a new output.
    #[must_use]
    pub fn new(raw: impl Into<String>, fields: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            raw: raw.into(),
            fields,
        }
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Returns a field as a string slice if it holds a JSON string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(serde_json::Value::as_str)
    }

    /// Returns true if the output carries the field.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the field names in order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let mut fields = BTreeMap::new();
        fields.insert("market_analysis".to_string(), json!("Growing market"));
        fields.insert("personas".to_string(), json!(["Busy parent"]));
        let output = StructuredOutput::new("{...}", fields);

        assert_eq!(output.get_str("market_analysis"), Some("Growing market"));
        assert_eq!(output.get_str("personas"), None);
        assert!(output.contains("personas"));
        assert!(!output.contains("risks"));
    }

    #[test]
    fn test_field_names_are_sorted() {
        let mut fields = BTreeMap::new();
        fields.insert("zeta".to_string(), json!(1));
        fields.insert("alpha".to_string(), json!(2));
        let output = StructuredOutput::new("", fields);

        assert_eq!(output.field_names(), vec!["alpha", "zeta"]);
    }
}
