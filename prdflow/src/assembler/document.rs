//! PRD document rendering.
//!
//! Rendering is a pure function of the stage outputs: values are emitted
//! in a fixed order and object keys are sorted, so the same run always
//! produces the same bytes.

use super::mockup::{Component, MockupSpec};
use super::plan::ExecutionPlan;
use crate::core::StageId;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;

/// Where one document section takes its content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSource {
    /// Section title.
    pub title: &'static str,
    /// Producing stage.
    pub stage: StageId,
    /// Output field of that stage.
    pub field: &'static str,
}

/// The ten PRD sections in document order.
pub const SECTION_SOURCES: [SectionSource; 10] = [
    SectionSource { title: "Executive Summary", stage: StageId::Synthesizer, field: "executive_summary" },
    SectionSource { title: "Market Analysis", stage: StageId::Strategist, field: "market_analysis" },
    SectionSource { title: "User Personas", stage: StageId::Strategist, field: "personas" },
    SectionSource { title: "Core Features", stage: StageId::Architect, field: "features" },
    SectionSource { title: "Technical Stack", stage: StageId::Architect, field: "tech_stack" },
    SectionSource { title: "UX Flows", stage: StageId::UxWriter, field: "ux_flows" },
    SectionSource { title: "Mockup Specifications", stage: StageId::MockupDesigner, field: "screens" },
    SectionSource { title: "12-Week Execution Plan", stage: StageId::Synthesizer, field: "execution_plan" },
    SectionSource { title: "Success Metrics", stage: StageId::Synthesizer, field: "success_metrics" },
    SectionSource { title: "Risks & Mitigations", stage: StageId::Synthesizer, field: "risks" },
];

/// One rendered section of the PRD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// 1-based section number.
    pub number: usize,
    /// Section title.
    pub title: String,
    /// Producing stage.
    pub source: StageId,
    /// Markdown body.
    pub body: String,
}

/// Renders an arbitrary JSON value as Markdown.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", render_inline(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => sorted_entries(map)
            .into_iter()
            .map(|(key, v)| format!("**{}**: {}", key, render_inline(v)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn render_inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items.iter().map(render_inline).collect::<Vec<_>>().join(", "),
        Value::Object(map) => {
            // Prefer the conventional name/title key as a lead-in.
            let lead = ["name", "title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str));
            let rest = sorted_entries(map)
                .into_iter()
                .filter(|(k, _)| lead.is_none() || !matches!(k.as_str(), "name" | "title"))
                .map(|(k, v)| format!("{k}: {}", render_inline(v)))
                .collect::<Vec<_>>()
                .join("; ");
            match lead {
                Some(lead) if rest.is_empty() => format!("**{lead}**"),
                Some(lead) => format!("**{lead}**: {rest}"),
                None => rest,
            }
        }
        other => render_value(other),
    }
}

fn sorted_entries(map: &serde_json::Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Renders the mockup screens as nested bullet lists.
#[must_use]
pub fn render_mockup(mockup: &MockupSpec) -> String {
    let mut out = String::new();
    for (index, screen) in mockup.screens.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "### {} (`{}`)", screen.name, screen.route);
        if let Some(layout) = &screen.layout {
            let _ = writeln!(out, "\nLayout: {layout}");
        }
        out.push('\n');
        render_components(&mut out, &screen.components, 0);
    }
    out.trim_end().to_string()
}

fn render_components(out: &mut String, components: &[Component], depth: usize) {
    for component in components {
        let indent = "  ".repeat(depth);
        match &component.label {
            Some(label) => {
                let _ = writeln!(out, "{indent}- {}: {label}", component.component_type);
            }
            None => {
                let _ = writeln!(out, "{indent}- {}", component.component_type);
            }
        }
        render_components(out, &component.children, depth + 1);
    }
}

/// Renders the execution plan, one subsection per phase.
#[must_use]
pub fn render_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    for (index, phase) in plan.phases.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "### {} (Weeks {}-{})\n",
            phase.name, phase.start_week, phase.end_week
        );
        for task in &phase.tasks {
            let _ = writeln!(out, "- {task}");
        }
    }
    out.trim_end().to_string()
}

/// Renders the full Markdown document.
#[must_use]
pub fn render_document(product_name: &str, idea: &str, sections: &[Section]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {product_name}: Product Requirements Document\n");
    let _ = writeln!(out, "> {}\n", idea.trim());
    for section in sections {
        let _ = writeln!(out, "## {}. {}\n", section.number, section.title);
        if section.body.is_empty() {
            out.push_str("_Not provided._\n\n");
        } else {
            let _ = writeln!(out, "{}\n", section.body);
        }
    }
    out.trim_end().to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::mockup::{ComponentType, Screen};
    use crate::assembler::plan::Phase;
    use serde_json::json;

    #[test]
    fn test_section_sources_cover_ten_sections() {
        assert_eq!(SECTION_SOURCES.len(), 10);
        assert_eq!(SECTION_SOURCES[0].field, "executive_summary");
        assert_eq!(SECTION_SOURCES[6].stage, StageId::MockupDesigner);
    }

    #[test]
    fn test_render_value_variants() {
        assert_eq!(render_value(&json!("  text ")), "text");
        assert_eq!(render_value(&json!(["a", "b"])), "- a\n- b");
        assert_eq!(render_value(&json!({"b": 1, "a": "x"})), "**a**: x\n**b**: 1");
        assert_eq!(
            render_value(&json!([{"name": "Ana", "goal": "drink more"}])),
            "- **Ana**: goal: drink more"
        );
    }

    #[test]
    fn test_render_mockup() {
        let mockup = MockupSpec {
            product_name: "P".into(),
            screens: vec![Screen {
                name: "Home".into(),
                route: "/".into(),
                layout: None,
                components: vec![Component::new(ComponentType::Card, "Today")
                    .with_child(Component::new(ComponentType::Button, "Log"))],
            }],
        };
        assert_eq!(render_mockup(&mockup), "### Home (`/`)\n\n- card: Today\n  - button: Log");
    }

    #[test]
    fn test_render_plan() {
        let plan = ExecutionPlan {
            phases: vec![Phase {
                name: "Build".into(),
                start_week: 1,
                end_week: 6,
                tasks: vec!["API".into()],
            }],
        };
        assert_eq!(render_plan(&plan), "### Build (Weeks 1-6)\n\n- API");
    }

    #[test]
    fn test_render_document_marks_empty_sections() {
        let sections = vec![Section {
            number: 1,
            title: "Executive Summary".into(),
            source: StageId::Synthesizer,
            body: String::new(),
        }];
        let doc = render_document("P", "idea", &sections);
        assert!(doc.starts_with("# P: Product Requirements Document\n\n> idea\n"));
        assert!(doc.contains("## 1. Executive Summary\n\n_Not provided._"));
        assert!(doc.ends_with('\n'));
    }
}
