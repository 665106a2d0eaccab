//! The agent invoker: one model call for one stage.

use super::backend::{BackendError, CompletionRequest, ModelBackend};
use super::context::StageContext;
use super::{parse, template};
use crate::core::{StageId, StructuredOutput};
use crate::errors::PrdflowError;
use crate::stages::{self, StageDefinition};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single model call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps a model backend with prompt rendering, a call timeout and
/// schema-checked response parsing.
///
/// The invoker never retries; retry policy belongs to the orchestrator.
#[derive(Clone)]
pub struct AgentInvoker {
    backend: Arc<dyn ModelBackend>,
    call_timeout: Duration,
}

impl std::fmt::Debug for AgentInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentInvoker")
            .field("backend", &self.backend.name())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl AgentInvoker {
    /// Creates an invoker with the default call timeout.
    #[must_use]
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Renders the full prompt for a stage: the filled template followed
    /// by the answer-format instructions derived from the output schema.
    ///
    /// # Errors
    ///
    /// - `Validation` if `stage` has no definition
    /// - `MissingContextField` if a placeholder has no value
    pub fn render_prompt(
        &self,
        stage: StageId,
        prompt_template: &str,
        context: &StageContext,
    ) -> Result<String, PrdflowError> {
        let def = lookup(stage)?;
        let mut prompt = template::render(prompt_template, context.values())
            .map_err(|field| PrdflowError::MissingContextField { stage, field })?;

        prompt.push_str("\n\nRespond with a single JSON object and nothing else. It must contain exactly these fields:\n");
        for field in def.output_schema {
            let _ = writeln!(prompt, "- \"{}\": {}", field.name, field.kind.describe());
        }
        Ok(prompt)
    }

    /// Renders the prompt and calls the model.
    ///
    /// # Errors
    ///
    /// - `MissingContextField` if a placeholder has no value
    /// - `ModelUnavailable` on transport failure, rate limiting or timeout
    /// - `ModelResponseInvalid` if the answer does not match the schema
    pub async fn invoke(
        &self,
        stage: StageId,
        prompt_template: &str,
        context: &StageContext,
    ) -> Result<StructuredOutput, PrdflowError> {
        let prompt = self.render_prompt(stage, prompt_template, context)?;
        self.invoke_rendered(stage, &prompt).await
    }

    /// Calls the model with an already rendered prompt.
    ///
    /// # Errors
    ///
    /// - `ModelUnavailable` on transport failure, rate limiting or timeout
    /// - `ModelRejected` if the service refused the request
    /// - `ModelResponseInvalid` if the answer does not match the schema
    pub async fn invoke_rendered(
        &self,
        stage: StageId,
        prompt: &str,
    ) -> Result<StructuredOutput, PrdflowError> {
        let def = lookup(stage)?;
        let request = CompletionRequest {
            stage,
            system: system_prompt(def),
            prompt: prompt.to_string(),
        };

        debug!(
            stage = %stage,
            backend = self.backend.name(),
            prompt_chars = request.prompt.chars().count(),
            "Invoking agent"
        );

        let answer = match tokio::time::timeout(self.call_timeout, self.backend.complete(&request)).await {
            Err(_) => {
                let timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(stage = %stage, timeout_ms, "Agent call timed out");
                return Err(PrdflowError::model_unavailable(
                    stage,
                    format!("timed out after {timeout_ms} ms"),
                ));
            }
            Ok(Err(BackendError::MalformedResponse(reason))) => {
                return Err(PrdflowError::response_invalid(stage, reason));
            }
            Ok(Err(e @ BackendError::Rejected { .. })) => {
                return Err(PrdflowError::model_rejected(stage, e.to_string()));
            }
            Ok(Err(e)) => return Err(PrdflowError::model_unavailable(stage, e.to_string())),
            Ok(Ok(answer)) => answer,
        };

        parse::parse_output(def, &answer).map_err(|reason| PrdflowError::response_invalid(stage, reason))
    }
}

fn lookup(stage: StageId) -> Result<&'static StageDefinition, PrdflowError> {
    stages::definition(stage)
        .ok_or_else(|| PrdflowError::validation(format!("no definition for stage '{stage}'")))
}

fn system_prompt(def: &StageDefinition) -> String {
    format!(
        "You are the {} on a product team. Answer only with a single JSON object.",
        def.role
    )
}
