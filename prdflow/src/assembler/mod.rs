//! Artifact assembly.
//!
//! Turns a completed run into the PRD bundle: the Markdown document with
//! its ten sections, the mockup specification, the execution plan and the
//! conversation transcript. Assembly is deterministic, so the bundle can be
//! rebuilt on demand from the persisted run at any time.

mod bundle;
mod document;
mod mockup;
mod plan;
mod transcript;

pub use bundle::{BundleWriter, Manifest, ManifestEntry, ZipBundleWriter, MANIFEST_FILE};
pub use document::{render_value, Section, SectionSource, SECTION_SOURCES};
pub use mockup::{parse_screens, validate_screens, Component, ComponentType, MockupSpec, Screen};
pub use plan::{ExecutionPlan, Phase};
pub use transcript::{format_history, Transcript, TranscriptMessage};

use crate::core::{Run, RunId, RunStatus, StageId};
use crate::errors::PrdflowError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single downloadable artifact of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The PRD document.
    PrdMarkdown,
    /// The mockup specification.
    MockupJson,
    /// The execution plan.
    ExecutionPlan,
    /// The conversation transcript.
    Conversation,
}

impl ArtifactKind {
    /// All artifact kinds in archive order.
    pub const ALL: [Self; 4] = [
        Self::PrdMarkdown,
        Self::MockupJson,
        Self::ExecutionPlan,
        Self::Conversation,
    ];

    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrdMarkdown => "prd_markdown",
            Self::MockupJson => "mockup_json",
            Self::ExecutionPlan => "execution_plan",
            Self::Conversation => "conversation",
        }
    }

    /// Returns the file name used inside the archive.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::PrdMarkdown => "PRD.md",
            Self::MockupJson => "mockup.json",
            Self::ExecutionPlan => "execution_plan.json",
            Self::Conversation => "conversation.json",
        }
    }

    /// Returns the MIME type.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::PrdMarkdown => "text/markdown; charset=utf-8",
            _ => "application/json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown artifact '{s}'"))
    }
}

/// The assembled output of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactBundle {
    /// The run the bundle was built from.
    pub run_id: RunId,
    /// Product name chosen by the mockup designer.
    pub product_name: String,
    /// The ten document sections in order.
    pub sections: Vec<Section>,
    /// The full Markdown document.
    pub document: String,
    /// The mockup specification.
    pub mockup: MockupSpec,
    /// The execution plan.
    pub execution_plan: ExecutionPlan,
    /// The conversation transcript.
    pub transcript: Transcript,
}

impl ArtifactBundle {
    /// Returns the bytes of one artifact.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a JSON artifact cannot be encoded.
    pub fn artifact_bytes(&self, kind: ArtifactKind) -> Result<Vec<u8>, PrdflowError> {
        let bytes = match kind {
            ArtifactKind::PrdMarkdown => self.document.clone().into_bytes(),
            ArtifactKind::MockupJson => serde_json::to_vec_pretty(&self.mockup)?,
            ArtifactKind::ExecutionPlan => serde_json::to_vec_pretty(&self.execution_plan)?,
            ArtifactKind::Conversation => serde_json::to_vec_pretty(&self.transcript)?,
        };
        Ok(bytes)
    }

    /// Returns every artifact as `(file name, bytes)` in archive order.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a JSON artifact cannot be encoded.
    pub fn files(&self) -> Result<Vec<(String, Vec<u8>)>, PrdflowError> {
        ArtifactKind::ALL
            .into_iter()
            .map(|kind| Ok((kind.file_name().to_string(), self.artifact_bytes(kind)?)))
            .collect()
    }

    /// Returns a section by its title.
    #[must_use]
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }
}

static NULL: Value = Value::Null;

fn stage_field<'a>(
    outputs: &BTreeMap<StageId, &'a BTreeMap<String, Value>>,
    stage: StageId,
    name: &str,
) -> &'a Value {
    outputs
        .get(&stage)
        .and_then(|fields| fields.get(name))
        .unwrap_or(&NULL)
}

/// Assembles the bundle for a completed run.
///
/// # Errors
///
/// - `IncompleteRun` if the run is not `completed` or a stage output is missing
/// - `InvalidMockupSchema` if a screen uses an unknown component type
/// - `Serialization` if a stored output has the wrong shape
pub fn assemble(run: &Run) -> Result<ArtifactBundle, PrdflowError> {
    if run.status != RunStatus::Completed || !run.all_stages_completed() {
        return Err(PrdflowError::IncompleteRun {
            run_id: run.id.to_string(),
            status: run.status,
        });
    }

    let outputs: BTreeMap<StageId, &BTreeMap<String, Value>> =
        run.stages.iter().map(|r| (r.stage, &r.output)).collect();
    let field = |stage: StageId, name: &str| stage_field(&outputs, stage, name);

    let product_name = match field(StageId::MockupDesigner, "product_name") {
        Value::String(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => "Untitled Product".to_string(),
    };
    let screens: Vec<Screen> = serde_json::from_value(field(StageId::MockupDesigner, "screens").clone())?;
    let mockup = MockupSpec {
        product_name: product_name.clone(),
        screens,
    };
    mockup.validate()?;

    let execution_plan = ExecutionPlan::from_value(field(StageId::Synthesizer, "execution_plan"))
        .map_err(PrdflowError::Serialization)?;

    let sections: Vec<Section> = SECTION_SOURCES
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let body = match (source.stage, source.field) {
                (StageId::MockupDesigner, "screens") => document::render_mockup(&mockup),
                (StageId::Synthesizer, "execution_plan") => document::render_plan(&execution_plan),
                (stage, name) => render_value(field(stage, name)),
            };
            Section {
                number: index + 1,
                title: source.title.to_string(),
                source: source.stage,
                body,
            }
        })
        .collect();

    let document = document::render_document(&product_name, &run.idea, &sections);

    Ok(ArtifactBundle {
        run_id: run.id.clone(),
        product_name,
        sections,
        document,
        mockup,
        execution_plan,
        transcript: Transcript::from_run(run),
    })
}
