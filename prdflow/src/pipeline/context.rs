//! The context accumulator threaded from stage to stage.

use crate::agents::{placeholders, StageContext, CONVERSATION_KEY};
use crate::assembler::format_history;
use crate::core::{Run, StageId, StageResult};
use crate::stages::StageDefinition;

/// Completed stage results of one run, in pipeline order, plus the idea.
///
/// Each stage sees only the outputs of its declared inputs. The
/// conversation history is offered only to templates that ask for it.
#[derive(Debug, Clone, Default)]
pub struct ContextAccumulator {
    idea: String,
    completed: Vec<StageResult>,
}

impl ContextAccumulator {
    /// Creates an empty accumulator for an idea.
    #[must_use]
    pub fn new(idea: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            completed: Vec::new(),
        }
    }

    /// Seeds an accumulator from the completed results of a run.
    #[must_use]
    pub fn from_run(run: &Run) -> Self {
        Self {
            idea: run.idea.clone(),
            completed: run
                .stages
                .iter()
                .filter(|r| r.is_completed())
                .cloned()
                .collect(),
        }
    }

    /// Merges a completed result.
    pub fn record(&mut self, result: StageResult) {
        if result.is_completed() {
            self.completed.retain(|r| r.stage != result.stage);
            self.completed.push(result);
            self.completed.sort_by_key(|r| r.stage.position());
        }
    }

    /// Returns the completed result of a stage.
    #[must_use]
    pub fn output_of(&self, stage: StageId) -> Option<&StageResult> {
        self.completed.iter().find(|r| r.stage == stage)
    }

    /// Number of completed stages merged so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Returns true if no stage has been merged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Builds the prompt context for a stage.
    ///
    /// Inputs that have not completed are simply absent, so rendering the
    /// template reports them as missing fields.
    #[must_use]
    pub fn context_for(&self, def: &StageDefinition) -> StageContext {
        let mut context = StageContext::new(self.idea.clone());
        for input in def.inputs {
            if let Some(result) = self.output_of(*input) {
                let rendered = serde_json::to_string_pretty(&result.output)
                    .unwrap_or_else(|_| result.raw_output.clone());
                context.insert(input.context_key(), rendered);
            }
        }
        if placeholders(def.prompt_template).contains(&CONVERSATION_KEY) {
            context.insert(CONVERSATION_KEY, format_history(&self.completed));
        }
        context
    }
}
