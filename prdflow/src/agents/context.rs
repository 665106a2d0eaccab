//! The values available to a prompt template.

use std::collections::BTreeMap;

/// Context key that always holds the product idea.
pub const IDEA_KEY: &str = "idea";

/// Context key holding the formatted conversation so far.
pub const CONVERSATION_KEY: &str = "conversation";

/// Placeholder values for one stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageContext {
    values: BTreeMap<String, String>,
}

impl StageContext {
    /// Creates a context holding only the idea.
    #[must_use]
    pub fn new(idea: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(IDEA_KEY.to_string(), idea.into());
        Self { values }
    }

    /// Adds a value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the context keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Returns all values.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}
