//! Run and stage identifiers.

use crate::utils::generate_uuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, unique run identifier.
///
/// Generated from a UUID v4, giving 122 bits of randomness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_uuid().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of one of the five pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    /// Market and problem analysis.
    Strategist,
    /// Feature set and technical design.
    Architect,
    /// User flows and microcopy.
    UxWriter,
    /// Screen and component mockups.
    MockupDesigner,
    /// Final PRD synthesis and execution plan.
    Synthesizer,
}

impl StageId {
    /// All stages in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::Strategist,
        Self::Architect,
        Self::UxWriter,
        Self::MockupDesigner,
        Self::Synthesizer,
    ];

    /// Returns the kebab-case identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategist => "strategist",
            Self::Architect => "architect",
            Self::UxWriter => "ux-writer",
            Self::MockupDesigner => "mockup-designer",
            Self::Synthesizer => "synthesizer",
        }
    }

    /// Returns the snake_case key under which this stage's output is
    /// exposed to prompt templates.
    #[must_use]
    pub fn context_key(&self) -> &'static str {
        match self {
            Self::Strategist => "strategist",
            Self::Architect => "architect",
            Self::UxWriter => "ux_writer",
            Self::MockupDesigner => "mockup_designer",
            Self::Synthesizer => "synthesizer",
        }
    }

    /// Returns the zero-based position of the stage in the pipeline.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Strategist => 0,
            Self::Architect => 1,
            Self::UxWriter => 2,
            Self::MockupDesigner => 3,
            Self::Synthesizer => 4,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "strategist" => Ok(Self::Strategist),
            "architect" => Ok(Self::Architect),
            "ux-writer" => Ok(Self::UxWriter),
            "mockup-designer" => Ok(Self::MockupDesigner),
            "synthesizer" => Ok(Self::Synthesizer),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}
