//! Run lifecycle events.

use super::{RunId, StageId};
use crate::utils::{generate_uuid_v7, iso_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// An event emitted by the orchestrator as a run progresses.
///
/// Events are delivered to an [`EventSink`](crate::events::EventSink) and
/// are purely observational: nothing in the pipeline reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Time-ordered event identifier.
    pub event_id: String,

    /// The event type (e.g., "run.started", "stage.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (RFC 3339).
    pub timestamp: String,

    /// The run the event belongs to.
    pub run_id: RunId,

    /// The event payload data.
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl RunEvent {
    /// Creates a new event for a run.
    #[must_use]
    pub fn new(event_type: impl Into<String>, run_id: &RunId) -> Self {
        Self {
            event_id: generate_uuid_v7().to_string(),
            event_type: event_type.into(),
            timestamp: iso_timestamp(),
            run_id: run_id.clone(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the payload handed to event sinks.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "event_id": self.event_id,
            "timestamp": self.timestamp,
            "run_id": self.run_id,
            "data": self.data,
        })
    }

    /// Creates a "run.created" event.
    #[must_use]
    pub fn run_created(run_id: &RunId, idea_chars: usize) -> Self {
        Self::new("run.created", run_id).add_data("idea_chars", json!(idea_chars))
    }

    /// Creates a "run.started" event.
    #[must_use]
    pub fn run_started(run_id: &RunId) -> Self {
        Self::new("run.started", run_id)
    }

    /// Creates a "run.resumed" event.
    #[must_use]
    pub fn run_resumed(run_id: &RunId, next_stage: Option<StageId>) -> Self {
        Self::new("run.resumed", run_id).add_data("next_stage", json!(next_stage))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(run_id: &RunId, stage: StageId) -> Self {
        Self::new("stage.started", run_id).add_data("stage", json!(stage))
    }

    /// Creates a "stage.retrying" event.
    #[must_use]
    pub fn stage_retrying(run_id: &RunId, stage: StageId, attempt: u32, delay_ms: u64, error: &str) -> Self {
        Self::new("stage.retrying", run_id)
            .add_data("stage", json!(stage))
            .add_data("attempt", json!(attempt))
            .add_data("delay_ms", json!(delay_ms))
            .add_data("error", json!(error))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn stage_completed(run_id: &RunId, stage: StageId, attempts: u32, duration_ms: u64) -> Self {
        Self::new("stage.completed", run_id)
            .add_data("stage", json!(stage))
            .add_data("attempts", json!(attempts))
            .add_data("duration_ms", json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(run_id: &RunId, stage: StageId, error: &str) -> Self {
        Self::new("stage.failed", run_id)
            .add_data("stage", json!(stage))
            .add_data("error", json!(error))
    }

    /// Creates a "run.completed" event.
    #[must_use]
    pub fn run_completed(run_id: &RunId, duration_ms: u64) -> Self {
        Self::new("run.completed", run_id).add_data("duration_ms", json!(duration_ms))
    }

    /// Creates a "run.failed" event.
    #[must_use]
    pub fn run_failed(run_id: &RunId, error: &str) -> Self {
        Self::new("run.failed", run_id).add_data("error", json!(error))
    }

    /// Creates a "run.cancelled" event.
    #[must_use]
    pub fn run_cancelled(run_id: &RunId, reason: &str) -> Self {
        Self::new("run.cancelled", run_id).add_data("reason", json!(reason))
    }
}
