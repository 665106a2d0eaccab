//! Scripted model backends for tests.

use crate::agents::{BackendError, CompletionRequest, ModelBackend, StubBackend};
use crate::core::StageId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

type Scripted = Result<String, BackendError>;

/// A backend that replays scripted answers.
///
/// Answers scripted for a specific stage are consumed first, then the
/// shared queue. When both are empty the canned stub answer is returned,
/// so a test only needs to script the calls it cares about.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    latency: Duration,
    queue: Mutex<VecDeque<Scripted>>,
    per_stage: Mutex<HashMap<StageId, VecDeque<Scripted>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    /// Creates a backend with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues an answer for the next call of any stage.
    #[must_use]
    pub fn push_ok(self, answer: impl Into<String>) -> Self {
        self.queue.lock().push_back(Ok(answer.into()));
        self
    }

    /// Queues an error for the next call of any stage.
    #[must_use]
    pub fn push_err(self, error: BackendError) -> Self {
        self.queue.lock().push_back(Err(error));
        self
    }

    /// Queues an answer for the next call of `stage`.
    #[must_use]
    pub fn on_stage(self, stage: StageId, answer: Result<String, BackendError>) -> Self {
        self.per_stage
            .lock()
            .entry(stage)
            .or_default()
            .push_back(answer);
        self
    }

    /// Makes the next `times` calls of `stage` fail with `error`.
    #[must_use]
    pub fn fail_stage(self, stage: StageId, error: BackendError, times: usize) -> Self {
        (0..times).fold(self, |backend, _| backend.on_stage(stage, Err(error.clone())))
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the number of calls received for one stage.
    #[must_use]
    pub fn calls_for(&self, stage: StageId) -> usize {
        self.calls.lock().iter().filter(|r| r.stage == stage).count()
    }

    fn next_answer(&self, request: &CompletionRequest) -> Scripted {
        if let Some(answer) = self
            .per_stage
            .lock()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front)
        {
            return answer;
        }
        if let Some(answer) = self.queue.lock().pop_front() {
            return answer;
        }
        Ok(StubBackend::answer(request.stage, &request.prompt))
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.calls.lock().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.next_answer(request)
    }
}
