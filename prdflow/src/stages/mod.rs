//! Static stage definitions.
//!
//! The pipeline is a fixed, ordered table of five stages. Each stage names
//! the earlier stages whose outputs it consumes and the fields its agent
//! must return. The table is validated once at startup.

mod prompts;

use crate::core::StageId;
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use std::collections::HashSet;
use std::fmt;

/// Coarse kind of an output field, checked when parsing agent answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any non-null JSON value, usually prose.
    Text,
    /// A JSON array.
    List,
    /// An array of mockup screens.
    Screens,
    /// An execution plan object with a non-empty `phases` array.
    Plan,
}

impl FieldKind {
    /// Returns the shape description given to the model.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::List => "array of strings",
            Self::Screens => {
                "array of screens, each {\"name\", \"route\", \"layout\", \"components\"}; \
                 a component is {\"type\", \"label\", \"children\"} where type is one of \
                 header, card, form, table, list, chart, button"
            }
            Self::Plan => {
                "object {\"phases\": [{\"name\", \"start_week\", \"end_week\", \"tasks\": [string]}]} \
                 covering weeks 1 to 12"
            }
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::List => write!(f, "list"),
            Self::Screens => write!(f, "screens"),
            Self::Plan => write!(f, "plan"),
        }
    }
}

/// A named field in a stage's output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputField {
    /// The JSON key.
    pub name: &'static str,
    /// The expected kind.
    pub kind: FieldKind,
}

impl OutputField {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Static description of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    /// Stage identifier.
    pub id: StageId,
    /// Role played by the agent, used as its system persona.
    pub role: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Stages whose outputs this stage consumes, in order.
    pub inputs: &'static [StageId],
    /// Prompt template with `{placeholder}` names.
    pub prompt_template: &'static str,
    /// Fields the agent must return.
    pub output_schema: &'static [OutputField],
}

impl StageDefinition {
    /// Returns the names of the schema fields.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        self.output_schema.iter().map(|f| f.name).collect()
    }
}

static DEFINITIONS: [StageDefinition; 5] = [
    StageDefinition {
        id: StageId::Strategist,
        role: "product strategist",
        display_name: "Strategist",
        inputs: &[],
        prompt_template: prompts::STRATEGIST,
        output_schema: &[
            OutputField::new("problem_statement", FieldKind::Text),
            OutputField::new("market_analysis", FieldKind::Text),
            OutputField::new("personas", FieldKind::List),
            OutputField::new("assumptions", FieldKind::List),
        ],
    },
    StageDefinition {
        id: StageId::Architect,
        role: "software architect",
        display_name: "Architect",
        inputs: &[StageId::Strategist],
        prompt_template: prompts::ARCHITECT,
        output_schema: &[
            OutputField::new("features", FieldKind::List),
            OutputField::new("tech_stack", FieldKind::Text),
            OutputField::new("architecture_notes", FieldKind::Text),
        ],
    },
    StageDefinition {
        id: StageId::UxWriter,
        role: "UX writer",
        display_name: "UX Writer",
        inputs: &[StageId::Strategist, StageId::Architect],
        prompt_template: prompts::UX_WRITER,
        output_schema: &[
            OutputField::new("ux_flows", FieldKind::List),
            OutputField::new("microcopy", FieldKind::Text),
        ],
    },
    StageDefinition {
        id: StageId::MockupDesigner,
        role: "product designer",
        display_name: "Mockup Designer",
        inputs: &[StageId::Architect, StageId::UxWriter],
        prompt_template: prompts::MOCKUP_DESIGNER,
        output_schema: &[
            OutputField::new("product_name", FieldKind::Text),
            OutputField::new("screens", FieldKind::Screens),
        ],
    },
    StageDefinition {
        id: StageId::Synthesizer,
        role: "lead product manager",
        display_name: "Synthesizer",
        inputs: &[
            StageId::Strategist,
            StageId::Architect,
            StageId::UxWriter,
            StageId::MockupDesigner,
        ],
        prompt_template: prompts::SYNTHESIZER,
        output_schema: &[
            OutputField::new("executive_summary", FieldKind::Text),
            OutputField::new("execution_plan", FieldKind::Plan),
            OutputField::new("success_metrics", FieldKind::List),
            OutputField::new("risks", FieldKind::List),
        ],
    },
];

/// Returns the pipeline stages in execution order.
#[must_use]
pub fn definitions() -> &'static [StageDefinition] {
    &DEFINITIONS
}

/// Returns the definition for a stage.
#[must_use]
pub fn definition(stage: StageId) -> Option<&'static StageDefinition> {
    DEFINITIONS.iter().find(|d| d.id == stage)
}

/// Validates a stage table.
///
/// Every declared input must name a stage that appears strictly earlier
/// in the table; duplicate identifiers and empty tables are rejected.
///
/// # Errors
///
/// Returns a `PipelineValidationError` describing the first fault found.
pub fn validate_definitions(defs: &[StageDefinition]) -> Result<(), PipelineValidationError> {
    if defs.is_empty() {
        return Err(definition_error(
            "Pipeline has no stages",
            "PIPELINE-EMPTY",
            "Cannot run an empty pipeline",
            Vec::new(),
        ));
    }

    let all: HashSet<StageId> = defs.iter().map(|d| d.id).collect();
    let mut seen: HashSet<StageId> = HashSet::new();

    for def in defs {
        if !seen.insert(def.id) {
            return Err(definition_error(
                format!("Stage '{}' is defined more than once", def.id),
                "PIPELINE-DUPLICATE",
                format!("Duplicate stage '{}'", def.id),
                vec![def.id.to_string()],
            ));
        }

        for input in def.inputs {
            let stages = vec![def.id.to_string(), input.to_string()];
            if *input == def.id {
                return Err(definition_error(
                    format!("Stage '{}' depends on itself", def.id),
                    "PIPELINE-SELF-REF",
                    format!("Stage '{}' lists itself as an input", def.id),
                    stages,
                ));
            }
            if !all.contains(input) {
                return Err(definition_error(
                    format!("Stage '{}' depends on unknown stage '{input}'", def.id),
                    "PIPELINE-UNKNOWN-DEP",
                    format!("Dependency '{input}' not found"),
                    stages,
                ));
            }
            if !seen.contains(input) {
                return Err(definition_error(
                    format!("Stage '{}' depends on later stage '{input}'", def.id),
                    "PIPELINE-FORWARD-REF",
                    format!("Dependency '{input}' runs after '{}'", def.id),
                    stages,
                ));
            }
        }
    }

    Ok(())
}

fn definition_error(
    message: impl Into<String>,
    code: &str,
    summary: impl Into<String>,
    stages: Vec<String>,
) -> PipelineValidationError {
    let mut info = ContractErrorInfo::new(code, summary);
    if let Some(hint) = ContractSuggestions::get(code) {
        info = info.with_fix_hint(hint);
    }
    if let Some(stage) = stages.first() {
        info = info.with_context_entry("stage", stage.clone());
    }
    PipelineValidationError::new(message)
        .with_stages(stages)
        .with_error_info(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn stage(id: StageId, inputs: &'static [StageId]) -> StageDefinition {
        StageDefinition {
            id,
            role: "tester",
            display_name: "Test",
            inputs,
            prompt_template: "{idea}",
            output_schema: &[],
        }
    }

    #[test]
    fn test_builtin_definitions_are_valid() {
        validate_definitions(definitions()).unwrap();
    }

    #[test]
    fn test_definitions_follow_pipeline_order() {
        let ids: Vec<StageId> = definitions().iter().map(|d| d.id).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
    }

    #[test]
    fn test_templates_only_reference_declared_inputs() {
        let placeholder = Regex::new(r"\{([a-z][a-z0-9_]*)\}").unwrap();
        for def in definitions() {
            for cap in placeholder.captures_iter(def.prompt_template) {
                let name = &cap[1];
                let allowed = name == "idea"
                    || (def.id == StageId::Synthesizer && name == "conversation")
                    || def.inputs.iter().any(|s| s.context_key() == name);
                assert!(allowed, "stage '{}' references '{name}'", def.id);
            }
        }
    }

    #[test]
    fn test_definition_lookup() {
        let def = definition(StageId::MockupDesigner).unwrap();
        assert_eq!(def.field_names(), vec!["product_name", "screens"]);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let defs = [
            stage(StageId::Strategist, &[StageId::Architect]),
            stage(StageId::Architect, &[]),
        ];
        let err = validate_definitions(&defs).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-FORWARD-REF"));
        assert!(err.error_info.unwrap().fix_hint.is_some());
    }

    #[test]
    fn test_self_reference_rejected() {
        let defs = [stage(StageId::Strategist, &[StageId::Strategist])];
        let err = validate_definitions(&defs).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-SELF-REF"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let defs = [stage(StageId::Architect, &[StageId::Strategist])];
        let err = validate_definitions(&defs).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-UNKNOWN-DEP"));
        assert_eq!(err.stages, vec!["architect", "strategist"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let defs = [stage(StageId::Strategist, &[]), stage(StageId::Strategist, &[])];
        let err = validate_definitions(&defs).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-DUPLICATE"));
    }

    #[test]
    fn test_empty_rejected() {
        let err = validate_definitions(&[]).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
    }
}
