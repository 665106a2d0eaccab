//! `{placeholder}` template rendering.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Returns the placeholder names of a template in order of appearance.
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Fills every placeholder from `context`.
///
/// Braces that do not form a placeholder (for example JSON in the
/// template) are left untouched.
///
/// # Errors
///
/// Returns the name of the first placeholder without a value.
pub fn render(template: &str, context: &BTreeMap<String, String>) -> Result<String, String> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !context.contains_key(*name))
    {
        return Err(missing.to_string());
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            context.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}
