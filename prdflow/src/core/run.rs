//! The run model and its per-stage results.
//!
//! All lifecycle rules live here: the orchestrator only ever mutates a
//! [`Run`] through these methods, inside a store update, so an illegal
//! transition is rejected before it can be persisted.

use super::{RunId, RunStatus, StageId, StageStatus, StructuredOutput};
use crate::errors::PrdflowError;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The recorded outcome of executing one stage within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage this result belongs to.
    pub stage: StageId,
    /// Current status.
    pub status: StageStatus,
    /// The rendered prompt sent to the model.
    #[serde(default)]
    pub prompt: String,
    /// The model's raw answer (empty until completed).
    #[serde(default)]
    pub raw_output: String,
    /// Parsed schema fields (empty until completed).
    #[serde(default)]
    pub output: BTreeMap<String, serde_json::Value>,
    /// Error recorded verbatim when the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of agent calls made for this stage.
    #[serde(default)]
    pub attempts: u32,
    /// When the stage started.
    pub started_at: Timestamp,
    /// When the stage reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
}

impl StageResult {
    /// Creates a result in `working` state.
    #[must_use]
    pub fn working(stage: StageId, prompt: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Working,
            prompt: prompt.into(),
            raw_output: String::new(),
            output: BTreeMap::new(),
            error: None,
            attempts: 0,
            started_at: now_utc(),
            ended_at: None,
        }
    }

    /// Returns the output as a [`StructuredOutput`].
    #[must_use]
    pub fn structured_output(&self) -> StructuredOutput {
        StructuredOutput::new(self.raw_output.clone(), self.output.clone())
    }

    /// Returns the duration in milliseconds, if the stage has ended.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_milliseconds())
    }

    /// Returns true if the stage completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

/// One end-to-end execution of the pipeline for a single product idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier.
    pub id: RunId,
    /// The submitted product idea.
    pub idea: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Stage results, in pipeline order. Stages not yet started are absent.
    #[serde(default)]
    pub stages: Vec<StageResult>,
    /// When the run was created.
    pub created_at: Timestamp,
    /// When the run was last mutated.
    pub updated_at: Timestamp,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Failure description; names the failing stage for stage faults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reason given when the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Run {
    /// Creates a new pending run.
    #[must_use]
    pub fn new(idea: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            id: RunId::generate(),
            idea: idea.into(),
            status: RunStatus::Pending,
            stages: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            cancel_reason: None,
        }
    }

    /// Returns true once the run can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the run to a new status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the lifecycle forbids the move.
    pub fn transition(&mut self, to: RunStatus) -> Result<(), PrdflowError> {
        if !self.status.can_transition_to(to) {
            return Err(PrdflowError::InvalidTransition {
                run_id: self.id.to_string(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.touch();
        if to.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Returns the first stage that has not completed, if any.
    #[must_use]
    pub fn next_stage(&self) -> Option<StageId> {
        let completed = self.stages.iter().take_while(|r| r.is_completed()).count();
        StageId::ALL.get(completed).copied()
    }

    /// Returns the result for a stage, if the stage has started.
    #[must_use]
    pub fn stage_result(&self, stage: StageId) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Returns the status of a stage; absent stages are `idle`.
    #[must_use]
    pub fn stage_status(&self, stage: StageId) -> StageStatus {
        self.stage_result(stage)
            .map_or(StageStatus::Idle, |r| r.status)
    }

    /// Returns true if every stage in the pipeline has completed.
    #[must_use]
    pub fn all_stages_completed(&self) -> bool {
        self.stages.len() == StageId::ALL.len() && self.stages.iter().all(StageResult::is_completed)
    }

    /// Appends a `working` result for the next stage.
    ///
    /// # Errors
    ///
    /// Fails if the run is not running or `stage` is not the next stage in order.
    pub fn begin_stage(&mut self, stage: StageId, prompt: impl Into<String>) -> Result<(), PrdflowError> {
        self.ensure_running(stage)?;
        if self.next_stage() != Some(stage) || self.stages.len() != stage.position() {
            return Err(PrdflowError::Validation(format!(
                "stage '{stage}' cannot start: expected {}",
                self.next_stage()
                    .map_or_else(|| "no further stage".to_string(), |s| format!("'{s}'")),
            )));
        }
        self.stages.push(StageResult::working(stage, prompt));
        self.touch();
        Ok(())
    }

    /// Records a successful stage output.
    ///
    /// # Errors
    ///
    /// Fails if the run is not running or `stage` is not the working stage.
    pub fn complete_stage(
        &mut self,
        stage: StageId,
        output: StructuredOutput,
        attempts: u32,
    ) -> Result<(), PrdflowError> {
        self.ensure_running(stage)?;
        let now = now_utc();
        let result = self.working_result_mut(stage)?;
        result.status = StageStatus::Completed;
        result.raw_output = output.raw;
        result.output = output.fields;
        result.attempts = attempts;
        result.ended_at = Some(now);
        self.touch();
        Ok(())
    }

    /// Records a stage failure and fails the run.
    ///
    /// # Errors
    ///
    /// Fails if the run is not running or `stage` is not the working stage.
    pub fn fail_stage(
        &mut self,
        stage: StageId,
        error: impl Into<String>,
        attempts: u32,
    ) -> Result<(), PrdflowError> {
        self.ensure_running(stage)?;
        let error = error.into();
        let now = now_utc();
        let result = self.working_result_mut(stage)?;
        result.status = StageStatus::Failed;
        result.error = Some(error.clone());
        result.attempts = attempts;
        result.ended_at = Some(now);
        self.error = Some(format!("Stage '{stage}' failed: {error}"));
        self.transition(RunStatus::Failed)
    }

    /// Marks the run completed.
    ///
    /// # Errors
    ///
    /// Fails unless every stage has completed.
    pub fn complete(&mut self) -> Result<(), PrdflowError> {
        if !self.all_stages_completed() {
            return Err(PrdflowError::IncompleteRun {
                run_id: self.id.to_string(),
                status: self.status,
            });
        }
        self.transition(RunStatus::Completed)
    }

    /// Fails the run with a run-level error.
    ///
    /// # Errors
    ///
    /// Fails if the run is already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), PrdflowError> {
        self.transition(RunStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Cancels the run, dropping any unfinished stage result.
    ///
    /// # Errors
    ///
    /// Fails if the run is already terminal.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), PrdflowError> {
        self.transition(RunStatus::Cancelled)?;
        self.stages.retain(StageResult::is_completed);
        self.cancel_reason = Some(reason.into());
        Ok(())
    }

    /// Drops results that never reached a terminal status.
    ///
    /// Used when resuming a run after an interrupted process: completed
    /// results are kept, the interrupted stage will execute again.
    /// Returns the number of discarded results.
    pub fn discard_unfinished(&mut self) -> usize {
        let before = self.stages.len();
        self.stages.retain(StageResult::is_completed);
        let discarded = before - self.stages.len();
        if discarded > 0 {
            self.touch();
        }
        discarded
    }

    fn ensure_running(&self, stage: StageId) -> Result<(), PrdflowError> {
        match self.status {
            RunStatus::Running => Ok(()),
            RunStatus::Cancelled => Err(PrdflowError::Cancelled(self.id.to_string())),
            other => {
                tracing::debug!(run_id = %self.id, stage = %stage, status = %other, "stage mutation on non-running run");
                Err(PrdflowError::InvalidTransition {
                    run_id: self.id.to_string(),
                    from: other,
                    to: RunStatus::Running,
                })
            }
        }
    }

    fn working_result_mut(&mut self, stage: StageId) -> Result<&mut StageResult, PrdflowError> {
        match self.stages.last_mut() {
            Some(result) if result.stage == stage && result.status == StageStatus::Working => {
                Ok(result)
            }
            _ => Err(PrdflowError::Validation(format!(
                "stage '{stage}' is not the working stage"
            ))),
        }
    }

    fn touch(&mut self) {
        self.updated_at = now_utc();
    }
}
