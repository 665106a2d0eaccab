//! End-to-end tests for run execution.

#[cfg(test)]
mod tests {
    use crate::agents::{AgentInvoker, BackendError, ModelBackend};
    use crate::assembler::{assemble, BundleWriter, ZipBundleWriter, SECTION_SOURCES};
    use crate::core::{Run, RunEvent, RunId, RunStatus, StageId, StageStatus};
    use crate::errors::PrdflowError;
    use crate::events::{CollectingEventSink, EventSink};
    use crate::pipeline::{JitterStrategy, Orchestrator, RetryConfig};
    use crate::store::{FileRunStore, InMemoryRunStore, RunMutator, RunStore};
    use crate::testing::{partial_run, ScriptedBackend, WATER_INTAKE_IDEA};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::{Duration, Instant};

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
            .with_jitter(JitterStrategy::None)
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        backend: Arc<ScriptedBackend>,
        store: Arc<dyn RunStore>,
        events: Arc<CollectingEventSink>,
    }

    fn harness(backend: ScriptedBackend) -> Harness {
        harness_with_store(backend, Arc::new(InMemoryRunStore::new()))
    }

    fn harness_with_store(backend: ScriptedBackend, store: Arc<dyn RunStore>) -> Harness {
        let backend = Arc::new(backend);
        let events = Arc::new(CollectingEventSink::new());
        let invoker = AgentInvoker::new(Arc::clone(&backend) as Arc<dyn ModelBackend>);
        let orchestrator = Orchestrator::new(Arc::clone(&store), invoker)
            .with_events(Arc::clone(&events) as Arc<dyn EventSink>)
            .with_retry(fast_retry());
        Harness {
            orchestrator: Arc::new(orchestrator),
            backend,
            store,
            events,
        }
    }

    fn assert_stage_prefix(run: &Run) {
        for (index, result) in run.stages.iter().enumerate() {
            assert_eq!(result.stage, StageId::ALL[index]);
        }
    }

    fn assert_completed_iff_all_stages(run: &Run) {
        assert!(run.is_terminal());
        assert_eq!(run.status == RunStatus::Completed, run.all_stages_completed());
    }

    #[tokio::test]
    async fn test_water_intake_run_completes_with_full_bundle() {
        let h = harness(ScriptedBackend::new());
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_stage_prefix(&done);
        assert_completed_iff_all_stages(&done);
        assert!(done.stages.iter().all(|r| r.attempts == 1));
        assert_eq!(h.backend.call_count(), 5);

        let bundle = h.orchestrator.bundle(&run.id).unwrap();
        assert_eq!(bundle.sections.len(), 10);
        for (section, source) in bundle.sections.iter().zip(SECTION_SOURCES.iter()) {
            assert_eq!(section.title, source.title);
            assert!(!section.body.trim().is_empty(), "section '{}' is empty", section.title);
            assert!(bundle.document.contains(&format!("## {}. {}", section.number, section.title)));
        }
        assert_eq!(bundle.mockup.screens.len(), 3);
        assert_eq!(bundle.execution_plan.total_weeks(), 12);
        assert_eq!(bundle.transcript.messages.len(), 5);
    }

    #[tokio::test]
    async fn test_successful_run_event_sequence() {
        let h = harness(ScriptedBackend::new());
        let run = h.orchestrator.create_run("A gym workout planner").await.unwrap();
        h.orchestrator.execute_run(&run.id).await.unwrap();

        let mut expected = vec!["run.created", "run.started"];
        for _ in StageId::ALL {
            expected.extend(["stage.started", "stage.completed"]);
        }
        expected.push("run.completed");
        assert_eq!(h.events.event_types(), expected);
        assert!(h.events.events().iter().all(|e| e.run_id == run.id));
    }

    #[tokio::test]
    async fn test_later_stages_receive_earlier_outputs() {
        let h = harness(ScriptedBackend::new());
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();
        h.orchestrator.execute_run(&run.id).await.unwrap();

        let calls = h.backend.calls();
        assert!(calls.iter().all(|c| c.prompt.contains(WATER_INTAKE_IDEA)));
        let architect = calls.iter().find(|c| c.stage == StageId::Architect).unwrap();
        assert!(architect.prompt.contains("market_analysis"));
        let designer = calls.iter().find(|c| c.stage == StageId::MockupDesigner).unwrap();
        assert!(designer.prompt.contains("microcopy"));
        assert!(!designer.prompt.contains("problem_statement"));
        let synthesizer = calls.iter().find(|c| c.stage == StageId::Synthesizer).unwrap();
        assert!(synthesizer.prompt.contains("=== ARCHITECT (Step 2) ==="));
    }

    #[tokio::test]
    async fn test_architect_unavailable_past_retry_bound_fails_run() {
        let backend = ScriptedBackend::new().fail_stage(
            StageId::Architect,
            BackendError::from_status(503, "model overloaded"),
            3,
        );
        let h = harness(backend);
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("architect"));
        assert_stage_prefix(&done);
        assert_completed_iff_all_stages(&done);
        assert_eq!(done.stage_status(StageId::Strategist), StageStatus::Completed);
        assert_eq!(done.stage_status(StageId::Architect), StageStatus::Failed);
        for stage in &StageId::ALL[2..] {
            assert!(done.stage_result(*stage).is_none());
        }

        let architect = done.stage_result(StageId::Architect).unwrap();
        assert_eq!(architect.attempts, 3);
        assert!(architect.error.as_deref().unwrap().contains("model overloaded"));
        assert_eq!(h.backend.calls_for(StageId::Architect), 3);
        assert_eq!(h.backend.calls_for(StageId::UxWriter), 0);

        assert_eq!(h.events.events_of_type("stage.retrying").len(), 2);
        assert_eq!(h.events.event_types().last().map(String::as_str), Some("run.failed"));
        assert_eq!(h.orchestrator.bundle(&run.id).unwrap_err().code(), "IncompleteRun");
    }

    #[tokio::test]
    async fn test_rejected_request_fails_without_retry() {
        let backend = ScriptedBackend::new().fail_stage(
            StageId::Strategist,
            BackendError::from_status(401, "invalid api key"),
            3,
        );
        let h = harness(backend);
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert_completed_iff_all_stages(&done);
        assert_eq!(done.stage_result(StageId::Strategist).unwrap().attempts, 1);
        assert_eq!(h.backend.call_count(), 1);
        assert!(h.events.events_of_type("stage.retrying").is_empty());
        assert!(done.error.as_deref().unwrap().contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let backend = ScriptedBackend::new().fail_stage(
            StageId::UxWriter,
            BackendError::Transport("connection reset".into()),
            2,
        );
        let h = harness(backend);
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.stage_result(StageId::UxWriter).unwrap().attempts, 3);

        let retries = h.events.events_of_type("stage.retrying");
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].data["attempt"], serde_json::json!(1));
        assert_eq!(retries[1].data["stage"], serde_json::json!("ux-writer"));
    }

    #[tokio::test]
    async fn test_invalid_answers_exhaust_retries() {
        let backend = ScriptedBackend::new()
            .on_stage(StageId::Strategist, Ok("Sounds like a great idea!".to_string()))
            .on_stage(StageId::Strategist, Ok("{\"problem_statement\": \"x\"}".to_string()))
            .on_stage(StageId::Strategist, Ok("```json\n[]\n```".to_string()));
        let h = harness(backend);
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert_eq!(done.stages.len(), 1);
        let error = done.stage_result(StageId::Strategist).unwrap().error.clone().unwrap();
        assert!(error.contains("Invalid model response"));
    }

    #[tokio::test]
    async fn test_unknown_component_type_fails_mockup_stage() {
        let bad_mockup = r#"{
            "product_name": "HydroTrack",
            "screens": [{"name": "Home", "route": "/", "components": [{"type": "carousel", "label": "Tips"}]}]
        }"#;
        let backend = (0..3).fold(ScriptedBackend::new(), |b, _| {
            b.on_stage(StageId::MockupDesigner, Ok(bad_mockup.to_string()))
        });
        let h = harness(backend);
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("mockup-designer"));
        assert!(done.error.as_deref().unwrap().contains("carousel"));
        assert!(done.stage_result(StageId::Synthesizer).is_none());
    }

    /// Cancels the run as soon as the architect stage completes.
    struct CancelAfterArchitect {
        orchestrator: OnceLock<Weak<Orchestrator>>,
        inner: CollectingEventSink,
    }

    #[async_trait]
    impl EventSink for CancelAfterArchitect {
        async fn emit(&self, event: &RunEvent) {
            self.inner.try_emit(event);
            let architect_done = event.event_type == "stage.completed"
                && event.data.get("stage") == Some(&serde_json::json!("architect"));
            if architect_done {
                if let Some(orchestrator) = self.orchestrator.get().and_then(Weak::upgrade) {
                    let id = event.run_id.clone();
                    orchestrator.cancel_run(&id, Some("changed my mind")).await.unwrap();
                }
            }
        }

        fn try_emit(&self, event: &RunEvent) {
            self.inner.try_emit(event);
        }
    }

    #[tokio::test]
    async fn test_cancel_between_stages_keeps_completed_prefix() {
        let backend = Arc::new(ScriptedBackend::new());
        let sink = Arc::new(CancelAfterArchitect {
            orchestrator: OnceLock::new(),
            inner: CollectingEventSink::new(),
        });
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let orchestrator = Arc::new(
            Orchestrator::new(store, AgentInvoker::new(Arc::clone(&backend) as Arc<dyn ModelBackend>))
                .with_events(Arc::clone(&sink) as Arc<dyn EventSink>)
                .with_retry(fast_retry()),
        );
        sink.orchestrator.set(Arc::downgrade(&orchestrator)).unwrap();

        let run = orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();
        let done = orchestrator.execute_run(&run.id).await.unwrap();

        assert_eq!(done.status, RunStatus::Cancelled);
        assert_eq!(done.cancel_reason.as_deref(), Some("changed my mind"));
        assert_eq!(done.stages.len(), 2);
        assert_stage_prefix(&done);
        assert_completed_iff_all_stages(&done);
        for stage in &StageId::ALL[2..] {
            assert!(done.stage_result(*stage).is_none());
        }
        assert_eq!(backend.calls_for(StageId::UxWriter), 0);
        assert!(sink.inner.event_types().contains(&"run.cancelled".to_string()));
        assert!(sink.inner.events_of_type("run.completed").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_call() {
        let h = harness(ScriptedBackend::new().with_latency(Duration::from_secs(30)));
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();
        let started = Instant::now();
        let handle = h.orchestrator.spawn_execution(run.id.clone());

        while h.store.get(&run.id).unwrap().stage_status(StageId::Strategist) != StageStatus::Working {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.orchestrator.cancel_run(&run.id, None).await.unwrap();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        let done = h.store.get(&run.id).unwrap();
        assert_eq!(done.status, RunStatus::Cancelled);
        assert!(done.stages.is_empty());
        assert!(h.events.events_of_type("stage.completed").is_empty());
    }

    #[tokio::test]
    async fn test_empty_idea_creates_nothing() {
        let h = harness(ScriptedBackend::new());
        for idea in ["", "   \n\t "] {
            let err = h.orchestrator.start_run(idea).await.unwrap_err();
            assert_eq!(err.code(), "ValidationError");
        }
        let err = h.orchestrator.create_run(&"a".repeat(1001)).await.unwrap_err();
        assert_eq!(err.code(), "ValidationError");

        assert_eq!(h.store.len(), 0);
        assert!(h.events.is_empty());
        assert_eq!(h.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_discards_interrupted_stage() {
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let mut interrupted = partial_run(WATER_INTAKE_IDEA, 2);
        interrupted.begin_stage(StageId::UxWriter, "stale prompt").unwrap();
        let id = interrupted.id.clone();
        store.put(interrupted).unwrap();

        let h = harness_with_store(ScriptedBackend::new(), store);
        let handles = h.orchestrator.resume_incomplete().await;
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.await.unwrap();
        }

        let done = h.store.get(&id).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_stage_prefix(&done);
        assert_ne!(done.stage_result(StageId::UxWriter).unwrap().prompt, "stale prompt");
        assert_eq!(h.backend.calls_for(StageId::Strategist), 0);
        assert_eq!(h.backend.calls_for(StageId::Architect), 0);
        assert_eq!(h.backend.call_count(), 3);

        let resumed = h.events.events_of_type("run.resumed");
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].data["next_stage"], serde_json::json!("ux-writer"));
        assert!(h.events.events_of_type("run.started").is_empty());
    }

    #[tokio::test]
    async fn test_resume_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileRunStore::open(dir.path()).unwrap();
            let run = partial_run("A team task board", 4);
            let id = run.id.clone();
            store.put(run).unwrap();
            id
        };

        let store: Arc<dyn RunStore> = Arc::new(FileRunStore::open(dir.path()).unwrap());
        let h = harness_with_store(ScriptedBackend::new(), store);
        for handle in h.orchestrator.resume_incomplete().await {
            handle.await.unwrap();
        }

        let reopened = FileRunStore::open(dir.path()).unwrap();
        let done = reopened.get(&id).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(h.backend.calls_for(StageId::Synthesizer), 1);
        assert_eq!(h.backend.call_count(), 1);
        assert!(h.orchestrator.bundle(&id).unwrap().product_name.contains("Productivity"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let backend = ScriptedBackend::new().fail_stage(
            StageId::Strategist,
            BackendError::RateLimited("slow down".into()),
            3,
        );
        let h = harness(backend.with_latency(Duration::from_millis(5)));

        let mut ids = Vec::new();
        for idea in ["A budget planner", "A meditation timer", "A gym workout planner"] {
            ids.push(h.orchestrator.create_run(idea).await.unwrap().id);
        }
        let handles = ids.iter().map(|id| h.orchestrator.spawn_execution(id.clone()));
        for joined in futures::future::join_all(handles).await {
            joined.unwrap();
        }

        let runs: Vec<Run> = ids.iter().map(|id| h.store.get(id).unwrap()).collect();
        for run in &runs {
            assert_stage_prefix(run);
            assert_completed_iff_all_stages(run);
        }
        // The three scripted failures are shared between the runs' first calls.
        let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
        let completed = runs.iter().filter(|r| r.status == RunStatus::Completed).count();
        assert_eq!(failed + completed, 3);
        assert!(completed >= 1);
    }

    #[tokio::test]
    async fn test_assembly_is_deterministic() {
        let h = harness(ScriptedBackend::new());
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();
        let done = h.orchestrator.execute_run(&run.id).await.unwrap();

        let writer = ZipBundleWriter::new();
        let first = writer.write(&assemble(&done).unwrap()).unwrap();
        let second = writer.write(&assemble(&done).unwrap()).unwrap();
        assert_eq!(first, second);

        let served = writer.write(&h.orchestrator.bundle(&run.id).unwrap()).unwrap();
        assert_eq!(served, first);
    }

    /// Store whose update rejects any mutation that would complete a run.
    struct RejectCompletionStore {
        inner: InMemoryRunStore,
    }

    impl RunStore for RejectCompletionStore {
        fn put(&self, run: Run) -> Result<(), PrdflowError> {
            self.inner.put(run)
        }

        fn get(&self, id: &RunId) -> Result<Run, PrdflowError> {
            self.inner.get(id)
        }

        fn update(&self, id: &RunId, mutator: &mut RunMutator<'_>) -> Result<Run, PrdflowError> {
            self.inner.update(id, &mut |run: &mut Run| {
                mutator(run)?;
                if run.status == RunStatus::Completed {
                    return Err(PrdflowError::Io(std::io::Error::other("disk full")));
                }
                Ok(())
            })
        }

        fn list(&self, limit: usize, offset: usize) -> Vec<Run> {
            self.inner.list(limit, offset)
        }

        fn incomplete(&self) -> Vec<Run> {
            self.inner.incomplete()
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[tokio::test]
    async fn test_unrecorded_completion_fails_run() {
        let store: Arc<dyn RunStore> = Arc::new(RejectCompletionStore {
            inner: InMemoryRunStore::new(),
        });
        let h = harness_with_store(ScriptedBackend::new(), store);
        let run = h.orchestrator.create_run(WATER_INTAKE_IDEA).await.unwrap();

        let done = h.orchestrator.execute_run(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert!(done.all_stages_completed());
        let error = done.error.unwrap();
        assert!(error.starts_with("Run completion could not be recorded"), "{error}");
        assert!(error.contains("disk full"));

        assert_eq!(h.orchestrator.bundle(&run.id).unwrap_err().code(), "IncompleteRun");
        assert_eq!(h.events.events_of_type("run.failed").len(), 1);
        assert!(h.events.events_of_type("run.completed").is_empty());
    }

    #[tokio::test]
    async fn test_mockup_schema_violation_at_assembly_fails_run() {
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let mut run = partial_run(WATER_INTAKE_IDEA, 4);
        let screens = run.stages[3].output.get_mut("screens").unwrap();
        screens[0]["components"][0]["type"] = serde_json::json!("carousel");
        let id = run.id.clone();
        store.put(run).unwrap();

        let h = harness_with_store(ScriptedBackend::new(), store);
        let done = h.orchestrator.execute_run(&id).await.unwrap();

        assert_eq!(done.status, RunStatus::Failed);
        assert_stage_prefix(&done);
        let error = done.error.unwrap();
        assert!(error.starts_with("Artifact assembly failed"), "{error}");
        assert!(error.contains("carousel"));
        assert_eq!(h.backend.calls_for(StageId::Synthesizer), 1);
        assert_eq!(h.orchestrator.bundle(&id).unwrap_err().code(), "IncompleteRun");
    }
}
