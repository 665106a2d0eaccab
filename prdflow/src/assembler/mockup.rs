//! Mockup specification: screens and their component trees.

use crate::errors::MockupSchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of component types a mockup may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Page or section header.
    Header,
    /// Content card.
    Card,
    /// Input form.
    Form,
    /// Tabular data.
    Table,
    /// Vertical list of items.
    List,
    /// Chart or graph.
    Chart,
    /// Action button.
    Button,
}

impl ComponentType {
    /// All allowed component types.
    pub const ALL: [Self; 7] = [
        Self::Header,
        Self::Card,
        Self::Form,
        Self::Table,
        Self::List,
        Self::Chart,
        Self::Button,
    ];

    /// Returns the lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Card => "card",
            Self::Form => "form",
            Self::Table => "table",
            Self::List => "list",
            Self::Chart => "chart",
            Self::Button => "button",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown component type '{s}'"))
    }
}

/// One node in a screen's component tree.
///
/// `component_type` is kept as the raw string so that a spec containing an
/// unknown type can still be loaded and then rejected with a precise path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Component type, one of [`ComponentType`].
    #[serde(rename = "type")]
    pub component_type: String,
    /// Visible label or title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Nested components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Component>,
    /// Any further properties, kept in key order.
    #[serde(flatten)]
    pub props: BTreeMap<String, serde_json::Value>,
}

impl Component {
    /// Creates a component with a label.
    #[must_use]
    pub fn new(component_type: ComponentType, label: impl Into<String>) -> Self {
        Self {
            component_type: component_type.as_str().to_string(),
            label: Some(label.into()),
            children: Vec::new(),
            props: BTreeMap::new(),
        }
    }

    /// Adds a child component.
    #[must_use]
    pub fn with_child(mut self, child: Component) -> Self {
        self.children.push(child);
        self
    }

    /// Returns the parsed component type, if valid.
    #[must_use]
    pub fn kind(&self) -> Option<ComponentType> {
        self.component_type.parse().ok()
    }
}

/// One screen of the mockup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    /// Screen name.
    pub name: String,
    /// Route in the application, e.g. `/dashboard`.
    #[serde(default)]
    pub route: String,
    /// Free-form layout hint (e.g. "single-column").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    /// Top-level components.
    #[serde(default)]
    pub components: Vec<Component>,
}

/// The complete mockup specification for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockupSpec {
    /// Product name shown on the screens.
    pub product_name: String,
    /// Screens in presentation order.
    pub screens: Vec<Screen>,
}

impl MockupSpec {
    /// Validates every component tree against the allowed component types.
    ///
    /// # Errors
    ///
    /// Returns the first unknown component type found, depth first.
    pub fn validate(&self) -> Result<(), MockupSchemaError> {
        validate_screens(&self.screens)
    }

    /// Returns the total number of components across all screens.
    #[must_use]
    pub fn component_count(&self) -> usize {
        fn count(components: &[Component]) -> usize {
            components.iter().map(|c| 1 + count(&c.children)).sum()
        }
        self.screens.iter().map(|s| count(&s.components)).sum()
    }
}

/// Validates a list of screens.
///
/// # Errors
///
/// Returns the first unknown component type found, depth first.
pub fn validate_screens(screens: &[Screen]) -> Result<(), MockupSchemaError> {
    for screen in screens {
        validate_components(&screen.name, "components", &screen.components)?;
    }
    Ok(())
}

fn validate_components(
    screen: &str,
    prefix: &str,
    components: &[Component],
) -> Result<(), MockupSchemaError> {
    for (index, component) in components.iter().enumerate() {
        let path = format!("{prefix}/{index}");
        if component.kind().is_none() {
            return Err(MockupSchemaError::new(screen, path, &component.component_type));
        }
        validate_components(screen, &format!("{path}/children"), &component.children)?;
    }
    Ok(())
}

/// Parses and validates a JSON screens array.
///
/// # Errors
///
/// Returns a description of the problem if the value is not an array of
/// screens or contains an unknown component type.
pub fn parse_screens(value: &serde_json::Value) -> Result<Vec<Screen>, String> {
    let screens: Vec<Screen> =
        serde_json::from_value(value.clone()).map_err(|e| format!("screens: {e}"))?;
    if screens.is_empty() {
        return Err("screens: at least one screen is required".to_string());
    }
    validate_screens(&screens).map_err(|e| e.to_string())?;
    Ok(screens)
}
