//! Conversation transcript: the ordered stage prompts and answers.

use crate::core::{Run, RunId, RunStatus, StageId, StageResult};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// One agent turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// The stage that spoke.
    pub role: StageId,
    /// 1-based step number.
    pub step: usize,
    /// Length of the rendered prompt in characters.
    pub prompt_length: usize,
    /// The prompt sent to the agent.
    pub prompt: String,
    /// The agent's raw answer.
    pub content: String,
    /// Number of calls it took.
    pub attempts: u32,
    /// When the answer was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl TranscriptMessage {
    fn from_result(result: &StageResult) -> Self {
        Self {
            role: result.stage,
            step: result.stage.position() + 1,
            prompt_length: result.prompt.chars().count(),
            prompt: result.prompt.clone(),
            content: result.raw_output.clone(),
            attempts: result.attempts,
            timestamp: result.ended_at,
        }
    }
}

/// The full conversation of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// The run identifier.
    pub run_id: RunId,
    /// The submitted idea.
    pub idea: String,
    /// Run status when the transcript was taken.
    pub status: RunStatus,
    /// When the run was created.
    pub created_at: Timestamp,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Completed agent turns in pipeline order.
    pub messages: Vec<TranscriptMessage>,
}

impl Transcript {
    /// Builds the transcript from the completed stages of a run.
    #[must_use]
    pub fn from_run(run: &Run) -> Self {
        Self {
            run_id: run.id.clone(),
            idea: run.idea.clone(),
            status: run.status,
            created_at: run.created_at,
            completed_at: run.completed_at,
            messages: run
                .stages
                .iter()
                .filter(|r| r.is_completed())
                .map(TranscriptMessage::from_result)
                .collect(),
        }
    }
}

/// Formats completed stage answers as a plain-text conversation history.
#[must_use]
pub fn format_history(results: &[StageResult]) -> String {
    let mut lines = Vec::new();
    for result in results.iter().filter(|r| r.is_completed()) {
        lines.push(format!(
            "=== {} (Step {}) ===",
            result.stage.as_str().to_ascii_uppercase(),
            result.stage.position() + 1
        ));
        lines.push(result.raw_output.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}
