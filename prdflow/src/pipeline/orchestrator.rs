//! The pipeline orchestrator.
//!
//! Drives one run through the five stages in order. Every status change is
//! written through [`RunStore::update`] before the next step begins, so a
//! reader of the store always sees a consistent run and a restarted
//! process can resume from what was persisted.

use super::context::ContextAccumulator;
use super::retry::{should_retry, RetryConfig, RetryDecision, RetryState};
use crate::agents::AgentInvoker;
use crate::assembler::{assemble, ArtifactBundle};
use crate::cancellation::CancellationToken;
use crate::core::{Run, RunEvent, RunId, RunStatus, StageId, StructuredOutput};
use crate::errors::PrdflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::WideEventEmitter;
use crate::stages::{self, StageDefinition};
use crate::store::RunStore;
use crate::utils::elapsed_ms;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Maximum idea length, in characters, after trimming.
pub const MAX_IDEA_CHARS: usize = 1000;

/// Reason recorded when a cancel request carries none.
pub const DEFAULT_CANCEL_REASON: &str = "cancelled by request";

/// Outcome of one stage execution.
enum StageOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Validates and normalizes a submitted product idea.
///
/// # Errors
///
/// Returns `Validation` if the trimmed idea is empty or too long.
pub fn validate_idea(idea: &str) -> Result<&str, PrdflowError> {
    let trimmed = idea.trim();
    if trimmed.is_empty() {
        return Err(PrdflowError::validation("product idea must not be empty"));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_IDEA_CHARS {
        return Err(PrdflowError::validation(format!(
            "product idea must be at most {MAX_IDEA_CHARS} characters, got {chars}"
        )));
    }
    Ok(trimmed)
}

/// Runs product ideas through the stage pipeline.
pub struct Orchestrator {
    store: Arc<dyn RunStore>,
    invoker: AgentInvoker,
    events: Arc<dyn EventSink>,
    retry: RetryConfig,
    tokens: DashMap<RunId, Arc<CancellationToken>>,
    wide: WideEventEmitter,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("invoker", &self.invoker)
            .field("retry", &self.retry)
            .field("runs", &self.store.len())
            .field("active", &self.active_runs())
            .finish()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default retry policy and no event sink.
    #[must_use]
    pub fn new(store: Arc<dyn RunStore>, invoker: AgentInvoker) -> Self {
        Self {
            store,
            invoker,
            events: Arc::new(NoOpEventSink),
            retry: RetryConfig::default(),
            tokens: DashMap::new(),
            wide: WideEventEmitter::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the per-stage retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the run store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Number of runs with a live cancellation token: created or executing,
    /// not yet finished by this process.
    #[must_use]
    pub fn active_runs(&self) -> usize {
        self.tokens.len()
    }

    /// Returns the name of the model backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.invoker.backend_name()
    }

    /// Validates the idea and stores a new pending run.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a rejected idea (nothing is stored), or a
    /// store error.
    pub async fn create_run(&self, idea: &str) -> Result<Run, PrdflowError> {
        let idea = validate_idea(idea)?;
        let run = Run::new(idea);
        self.store.put(run.clone())?;
        self.token_for(&run.id);

        info!(run_id = %run.id, idea_chars = idea.chars().count(), "Run created");
        self.events
            .emit(&RunEvent::run_created(&run.id, idea.chars().count()))
            .await;
        Ok(run)
    }

    /// Creates a run and executes it on a background task.
    ///
    /// # Errors
    ///
    /// Same as [`create_run`](Self::create_run).
    pub async fn start_run(self: &Arc<Self>, idea: &str) -> Result<Run, PrdflowError> {
        let run = self.create_run(idea).await?;
        self.spawn_execution(run.id.clone());
        Ok(run)
    }

    /// Returns a snapshot of a run.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown identifier.
    pub fn get_run(&self, id: &RunId) -> Result<Run, PrdflowError> {
        self.store.get(id)
    }

    /// Returns a page of runs, newest first.
    #[must_use]
    pub fn list_runs(&self, limit: usize, offset: usize) -> Vec<Run> {
        self.store.list(limit, offset)
    }

    /// Cancels a pending or running run.
    ///
    /// Completed stage results are kept; an in-flight call is abandoned and
    /// no further stage starts.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown identifier
    /// - `InvalidTransition` if the run is already terminal
    pub async fn cancel_run(&self, id: &RunId, reason: Option<&str>) -> Result<Run, PrdflowError> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_CANCEL_REASON)
            .to_string();

        let run = self.mutate(id, |run| run.cancel(reason.clone()))?;
        if let Some(token) = self.tokens.get(id).map(|t| Arc::clone(t.value())) {
            token.cancel(reason.clone());
        }

        info!(run_id = %id, reason = %reason, completed_stages = run.stages.len(), "Run cancelled");
        self.events.emit(&RunEvent::run_cancelled(id, &reason)).await;
        Ok(run)
    }

    /// Returns the artifact bundle of a completed run.
    ///
    /// The bundle is rebuilt from the stored run on every call. Assembly is
    /// deterministic and was already checked when the run completed.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown identifier
    /// - `IncompleteRun` if the run has not completed
    pub fn bundle(&self, id: &RunId) -> Result<ArtifactBundle, PrdflowError> {
        let run = self.store.get(id)?;
        if run.status != RunStatus::Completed {
            return Err(PrdflowError::IncompleteRun {
                run_id: id.to_string(),
                status: run.status,
            });
        }
        assemble(&run)
    }

    /// Resumes every run the store holds in `pending` or `running` state.
    ///
    /// Interrupted `working` results are discarded; each run continues at
    /// its first unfinished stage. Returns the handles of the spawned
    /// executions.
    pub async fn resume_incomplete(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut resumed = Vec::new();
        for run in self.store.incomplete() {
            let id = run.id.clone();
            let run = match self.mutate(&id, |run| {
                run.discard_unfinished();
                Ok(())
            }) {
                Ok(run) => run,
                Err(e) => {
                    warn!(run_id = %id, error = %e, "Failed to prepare run for resume");
                    continue;
                }
            };
            info!(run_id = %id, status = %run.status, next_stage = ?run.next_stage(), "Resuming run");
            self.events
                .emit(&RunEvent::run_resumed(&id, run.next_stage()))
                .await;
            self.token_for(&id);
            resumed.push(self.spawn_execution(id));
        }
        resumed
    }

    /// Spawns [`execute_run`](Self::execute_run) on the runtime.
    pub fn spawn_execution(self: &Arc<Self>, id: RunId) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let span = info_span!("run", run_id = %id);
        tokio::spawn(
            async move {
                if let Err(e) = this.execute_run(&id).await {
                    error!(error = %e, code = e.code(), "Run execution aborted");
                }
            }
            .instrument(span),
        )
    }

    /// Executes a run until it reaches a terminal status.
    ///
    /// A pending run is started; a running run (resumed after a restart)
    /// continues at its first unfinished stage. Returns the final snapshot.
    ///
    /// # Errors
    ///
    /// Returns store errors. Stage faults are recorded on the run, not
    /// returned.
    pub async fn execute_run(&self, id: &RunId) -> Result<Run, PrdflowError> {
        let token = self.token_for(id);
        let result = self.drive(id, &token).await;
        self.tokens.remove(id);
        if let Ok(run) = &result {
            if run.is_terminal() {
                self.wide.emit_run(run);
            }
        }
        result
    }

    async fn drive(&self, id: &RunId, token: &CancellationToken) -> Result<Run, PrdflowError> {
        let mut run = self.store.get(id)?;
        match run.status {
            RunStatus::Pending => {
                let started = self.mutate(id, |run| run.transition(RunStatus::Running));
                match started {
                    Ok(updated) => run = updated,
                    Err(PrdflowError::InvalidTransition { .. }) => return self.store.get(id),
                    Err(e) => return Err(e),
                }
                info!(run_id = %id, "Run started");
                self.events.emit(&RunEvent::run_started(id)).await;
            }
            RunStatus::Running => {
                debug!(run_id = %id, next_stage = ?run.next_stage(), "Continuing run");
            }
            _ => return Ok(run),
        }

        let mut context = ContextAccumulator::from_run(&run);
        while let Some(stage) = run.next_stage() {
            if token.is_cancelled() {
                debug!(run_id = %id, stage = %stage, "Cancellation observed before stage");
                return self.store.get(id);
            }
            let def = stages::definition(stage).ok_or_else(|| {
                PrdflowError::validation(format!("no definition for stage '{stage}'"))
            })?;

            match self.run_stage(id, def, &context, token).await? {
                StageOutcome::Completed => {}
                StageOutcome::Failed | StageOutcome::Cancelled => return self.store.get(id),
            }

            run = self.store.get(id)?;
            if let Some(result) = run.stage_result(stage) {
                context.record(result.clone());
            }
        }

        self.finish(id).await
    }

    async fn run_stage(
        &self,
        id: &RunId,
        def: &StageDefinition,
        context: &ContextAccumulator,
        token: &CancellationToken,
    ) -> Result<StageOutcome, PrdflowError> {
        let stage = def.id;
        let prompt = match self
            .invoker
            .render_prompt(stage, def.prompt_template, &context.context_for(def))
        {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(run_id = %id, stage = %stage, error = %e, "Stage prompt could not be rendered");
                let recorded = self.mutate(id, |run| {
                    run.begin_stage(stage, String::new())?;
                    run.fail_stage(stage, e.to_string(), 0)
                });
                return self.after_failure(id, stage, &e, recorded).await;
            }
        };

        let begun = self.mutate(id, |run| run.begin_stage(stage, prompt.clone()));
        match begun {
            Ok(_) => {}
            Err(PrdflowError::Cancelled(_)) => return Ok(StageOutcome::Cancelled),
            Err(e) => return Err(e),
        }
        info!(run_id = %id, stage = %stage, "Stage started");
        self.events.emit(&RunEvent::stage_started(id, stage)).await;

        let mut state = RetryState::new();
        let outcome: Result<StructuredOutput, PrdflowError> = loop {
            let attempt = state.begin_attempt();
            let call = self.invoker.invoke_rendered(stage, &prompt);
            let result = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(run_id = %id, stage = %stage, attempt, "In-flight call abandoned");
                    return Ok(StageOutcome::Cancelled);
                }
                result = call => result,
            };

            let err = match result {
                Ok(output) => break Ok(output),
                Err(e) => e,
            };
            match should_retry(&mut state, &self.retry, err.is_retryable()) {
                RetryDecision::Retry(delay) => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        run_id = %id,
                        stage = %stage,
                        attempt,
                        delay_ms,
                        error = %err,
                        "Stage attempt failed, retrying"
                    );
                    self.events
                        .emit(&RunEvent::stage_retrying(id, stage, attempt, delay_ms, &err.to_string()))
                        .await;
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Ok(StageOutcome::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp | RetryDecision::NotRetryable => break Err(err),
            }
        };

        let attempts = state.attempts;
        match outcome {
            Ok(output) => {
                let completed = self.mutate(id, |run| run.complete_stage(stage, output.clone(), attempts));
                let run = match completed {
                    Ok(run) => run,
                    Err(PrdflowError::Cancelled(_)) => {
                        debug!(run_id = %id, stage = %stage, "Discarding output of cancelled run");
                        return Ok(StageOutcome::Cancelled);
                    }
                    Err(e) => return Err(e),
                };
                let duration_ms = run
                    .stage_result(stage)
                    .and_then(|r| r.duration_ms())
                    .map_or(0, |ms| u64::try_from(ms).unwrap_or(0));
                info!(run_id = %id, stage = %stage, attempts, duration_ms, "Stage completed");
                self.events
                    .emit(&RunEvent::stage_completed(id, stage, attempts, duration_ms))
                    .await;
                Ok(StageOutcome::Completed)
            }
            Err(e) => {
                error!(run_id = %id, stage = %stage, attempts, error = %e, code = e.code(), "Stage failed");
                let recorded = self.mutate(id, |run| run.fail_stage(stage, e.to_string(), attempts));
                self.after_failure(id, stage, &e, recorded).await
            }
        }
    }

    async fn after_failure(
        &self,
        id: &RunId,
        stage: StageId,
        cause: &PrdflowError,
        recorded: Result<Run, PrdflowError>,
    ) -> Result<StageOutcome, PrdflowError> {
        match recorded {
            Ok(run) => {
                self.events
                    .emit(&RunEvent::stage_failed(id, stage, &cause.to_string()))
                    .await;
                let message = run.error.unwrap_or_else(|| cause.to_string());
                self.events.emit(&RunEvent::run_failed(id, &message)).await;
                Ok(StageOutcome::Failed)
            }
            Err(PrdflowError::Cancelled(_)) => Ok(StageOutcome::Cancelled),
            Err(e) => Err(e),
        }
    }

    async fn finish(&self, id: &RunId) -> Result<Run, PrdflowError> {
        let mut assembly_failed = false;
        let completed = self.mutate(id, |run| {
            run.complete()?;
            if let Err(e) = assemble(run) {
                assembly_failed = true;
                return Err(e);
            }
            Ok(())
        });

        match completed {
            Ok(run) => {
                let duration_ms = elapsed_ms(&run.created_at);
                info!(run_id = %id, duration_ms, "Run completed");
                self.events.emit(&RunEvent::run_completed(id, duration_ms)).await;
                Ok(run)
            }
            Err(e) => {
                let current = self.store.get(id)?;
                if current.is_terminal() {
                    return Ok(current);
                }
                let message = if assembly_failed {
                    error!(run_id = %id, error = %e, code = e.code(), "Artifact assembly failed");
                    format!("Artifact assembly failed: {e}")
                } else {
                    error!(run_id = %id, error = %e, code = e.code(), "Run completion could not be recorded");
                    format!("Run completion could not be recorded: {e}")
                };
                let failed = self.mutate(id, |run| run.fail(message.clone()))?;
                self.events.emit(&RunEvent::run_failed(id, &message)).await;
                Ok(failed)
            }
        }
    }

    fn mutate<F>(&self, id: &RunId, mut mutator: F) -> Result<Run, PrdflowError>
    where
        F: FnMut(&mut Run) -> Result<(), PrdflowError>,
    {
        self.store.update(id, &mut mutator)
    }

    fn token_for(&self, id: &RunId) -> Arc<CancellationToken> {
        Arc::clone(
            self.tokens
                .entry(id.clone())
                .or_insert_with(|| Arc::new(CancellationToken::new()))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::StubBackend;
    use crate::events::CollectingEventSink;
    use crate::store::InMemoryRunStore;

    fn orchestrator() -> Orchestrator {
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        Orchestrator::new(store, AgentInvoker::new(Arc::new(StubBackend::new())))
    }

    #[test]
    fn test_validate_idea() {
        assert_eq!(validate_idea("  water tracker \n").unwrap(), "water tracker");
        assert_eq!(validate_idea("   ").unwrap_err().code(), "ValidationError");
        assert!(validate_idea(&"x".repeat(MAX_IDEA_CHARS)).is_ok());
        assert!(validate_idea(&"x".repeat(MAX_IDEA_CHARS + 1)).is_err());
    }

    #[test]
    fn test_idea_length_counts_characters() {
        let idea = "é".repeat(MAX_IDEA_CHARS);
        assert!(validate_idea(&idea).is_ok());
    }

    #[tokio::test]
    async fn test_create_run_stores_trimmed_idea() {
        let sink = Arc::new(CollectingEventSink::new());
        let orch = orchestrator().with_events(sink.clone());

        let run = orch.create_run("  A budgeting app  ").await.unwrap();
        assert_eq!(run.idea, "A budgeting app");
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(orch.get_run(&run.id).unwrap(), run);
        assert_eq!(sink.event_types(), vec!["run.created"]);
    }

    #[tokio::test]
    async fn test_execute_pending_run_with_stub() {
        let orch = orchestrator();
        let run = orch.create_run("A meditation timer").await.unwrap();

        let done = orch.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.all_stages_completed());
        assert!(done.completed_at.is_some());
        assert_eq!(orch.bundle(&run.id).unwrap().sections.len(), 10);
    }

    #[tokio::test]
    async fn test_execute_terminal_run_is_noop() {
        let orch = orchestrator();
        let run = orch.create_run("idea").await.unwrap();
        orch.cancel_run(&run.id, None).await.unwrap();

        let after = orch.execute_run(&run.id).await.unwrap();
        assert_eq!(after.status, RunStatus::Cancelled);
        assert!(after.stages.is_empty());
        assert_eq!(after.cancel_reason.as_deref(), Some(DEFAULT_CANCEL_REASON));
    }

    #[tokio::test]
    async fn test_cancel_terminal_run_is_rejected() {
        let orch = orchestrator();
        let run = orch.create_run("idea").await.unwrap();
        orch.execute_run(&run.id).await.unwrap();

        let err = orch.cancel_run(&run.id, Some("late")).await.unwrap_err();
        assert_eq!(err.code(), "InvalidTransition");
    }

    #[tokio::test]
    async fn test_finished_runs_leave_no_per_run_state() {
        let orch = orchestrator();
        let mut ids = Vec::new();
        for idea in ["A meditation timer", "A budget planner", "A gym workout planner"] {
            let run = orch.create_run(idea).await.unwrap();
            orch.execute_run(&run.id).await.unwrap();
            ids.push(run.id);
        }
        assert_eq!(orch.active_runs(), 0);

        let fresh = Orchestrator::new(Arc::clone(orch.store()), AgentInvoker::new(Arc::new(StubBackend::new())));
        for id in &ids {
            assert_eq!(orch.bundle(id).unwrap(), fresh.bundle(id).unwrap());
        }
    }

    #[tokio::test]
    async fn test_bundle_of_pending_run_is_incomplete() {
        let orch = orchestrator();
        let run = orch.create_run("idea").await.unwrap();
        assert_eq!(orch.bundle(&run.id).unwrap_err().code(), "IncompleteRun");
        assert_eq!(orch.bundle(&RunId::from("nope")).unwrap_err().code(), "NotFound");
    }
}
