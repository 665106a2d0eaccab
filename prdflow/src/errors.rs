//! Error types for the prdflow service.
//!
//! `PrdflowError` is the crate-wide taxonomy. Every variant maps to a
//! stable code that the HTTP layer reports verbatim, and the retry policy
//! asks [`PrdflowError::is_retryable`] rather than matching variants itself.

use crate::core::{RunStatus, StageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The main error type for prdflow operations.
#[derive(Debug, Error)]
pub enum PrdflowError {
    /// The submitted product idea was rejected. No run is created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A prompt placeholder had no value in the stage context.
    #[error("Missing context field '{field}' for stage '{stage}'")]
    MissingContextField {
        /// The stage whose template referenced the field.
        stage: StageId,
        /// The placeholder name.
        field: String,
    },

    /// The static stage table failed validation.
    #[error("{0}")]
    InvalidPipelineDefinition(#[from] PipelineValidationError),

    /// The model backend could not be reached, timed out or refused the call.
    #[error("Model unavailable for stage '{stage}': {reason}")]
    ModelUnavailable {
        /// The stage being executed.
        stage: StageId,
        /// Backend-supplied reason.
        reason: String,
    },

    /// The model service refused the request (authentication, unknown
    /// model, malformed payload).
    #[error("Model rejected the request for stage '{stage}': {reason}")]
    ModelRejected {
        /// The stage being executed.
        stage: StageId,
        /// Backend-supplied reason.
        reason: String,
    },

    /// The model answered but the answer does not fit the stage schema.
    #[error("Invalid model response for stage '{stage}': {reason}")]
    ModelResponseInvalid {
        /// The stage being executed.
        stage: StageId,
        /// What did not match.
        reason: String,
    },

    /// Assembly was requested for a run that has not completed.
    #[error("Run '{run_id}' is not completed (status: {status})")]
    IncompleteRun {
        /// The run identifier.
        run_id: String,
        /// The status the run is actually in.
        status: RunStatus,
    },

    /// The mockup specification contains an unknown component type.
    #[error("{0}")]
    InvalidMockupSchema(#[from] MockupSchemaError),

    /// No run exists with the given identifier.
    #[error("Run not found: {0}")]
    NotFound(String),

    /// A status change that the run lifecycle does not allow.
    #[error("Invalid transition for run '{run_id}': {from} -> {to}")]
    InvalidTransition {
        /// The run identifier.
        run_id: String,
        /// Current status.
        from: RunStatus,
        /// Requested status.
        to: RunStatus,
    },

    /// The run was cancelled while work for it was pending.
    #[error("Run '{0}' was cancelled")]
    Cancelled(String),

    /// Writing the downloadable archive failed.
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrdflowError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a model-unavailable error for a stage.
    #[must_use]
    pub fn model_unavailable(stage: StageId, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            stage,
            reason: reason.into(),
        }
    }

    /// Creates a model-rejected error for a stage.
    #[must_use]
    pub fn model_rejected(stage: StageId, reason: impl Into<String>) -> Self {
        Self::ModelRejected {
            stage,
            reason: reason.into(),
        }
    }

    /// Creates a model-response-invalid error for a stage.
    #[must_use]
    pub fn response_invalid(stage: StageId, reason: impl Into<String>) -> Self {
        Self::ModelResponseInvalid {
            stage,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code reported to clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::MissingContextField { .. } => "MissingContextField",
            Self::InvalidPipelineDefinition(_) => "InvalidPipelineDefinition",
            Self::ModelUnavailable { .. } => "ModelUnavailable",
            Self::ModelRejected { .. } => "ModelRejected",
            Self::ModelResponseInvalid { .. } => "ModelResponseInvalid",
            Self::IncompleteRun { .. } => "IncompleteRun",
            Self::InvalidMockupSchema(_) => "InvalidMockupSchema",
            Self::NotFound(_) => "NotFound",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::Cancelled(_) => "Cancelled",
            Self::Bundle(_) => "BundleError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns true for transient per-stage faults that the orchestrator may retry.
    ///
    /// Structural faults (missing context, bad definitions) are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable { .. } | Self::ModelResponseInvalid { .. }
        )
    }

    /// Returns the stage this error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::MissingContextField { stage, .. }
            | Self::ModelUnavailable { stage, .. }
            | Self::ModelRejected { stage, .. }
            | Self::ModelResponseInvalid { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PrdflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a pipeline definition error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-FORWARD-REF").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the stage table fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if one was attached.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a mockup component tree does not match the schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid mockup schema in screen '{screen}' at {path}: unknown component type '{component_type}'")]
pub struct MockupSchemaError {
    /// The screen containing the bad component.
    pub screen: String,
    /// Slash-separated component path inside the screen (e.g. "components/2/children/0").
    pub path: String,
    /// The offending type string.
    pub component_type: String,
}

impl MockupSchemaError {
    /// Creates a new mockup schema error.
    #[must_use]
    pub fn new(
        screen: impl Into<String>,
        path: impl Into<String>,
        component_type: impl Into<String>,
    ) -> Self {
        Self {
            screen: screen.into(),
            path: path.into(),
            component_type: component_type.into(),
        }
    }
}

/// Provides default suggestions for pipeline definition error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-FORWARD-REF" => Some(
                "A stage may only consume outputs of stages that run before it. \
                 Move the dependency earlier or drop it.",
            ),
            "PIPELINE-SELF-REF" => Some("Remove the stage from its own input list."),
            "PIPELINE-UNKNOWN-DEP" => Some(
                "Ensure every input names a stage that exists in the pipeline.",
            ),
            "PIPELINE-DUPLICATE" => Some("Each stage identifier may appear only once."),
            "PIPELINE-EMPTY" => Some("Add at least one stage to the pipeline."),
            _ => None,
        }
    }
}
