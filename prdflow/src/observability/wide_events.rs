//! Wide events: one comprehensive log record per finished run.

use crate::core::{Run, StageId, StageStatus};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Emitter for wide run events.
#[derive(Debug, Clone)]
pub struct WideEventEmitter {
    /// Event type recorded with every payload.
    pub event_type: String,
}

impl Default for WideEventEmitter {
    fn default() -> Self {
        Self {
            event_type: "run.wide".to_string(),
        }
    }
}

impl WideEventEmitter {
    /// Creates a new wide event emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the payload for one stage result.
    #[must_use]
    pub fn build_stage_payload(run: &Run, stage: StageId) -> Value {
        let Some(result) = run.stage_result(stage) else {
            return json!({ "stage": stage, "status": StageStatus::Idle });
        };
        let mut payload = json!({
            "stage": stage,
            "status": result.status,
            "attempts": result.attempts,
            "duration_ms": result.duration_ms(),
            "fields": result.output.keys().collect::<Vec<_>>(),
        });
        if let Some(err) = &result.error {
            payload["error"] = json!(err);
        }
        payload
    }

    /// Builds the payload for a whole run.
    #[must_use]
    pub fn build_run_payload(run: &Run) -> Value {
        let mut stage_counts: BTreeMap<String, u32> = BTreeMap::new();
        for stage in StageId::ALL {
            *stage_counts.entry(run.stage_status(stage).to_string()).or_insert(0) += 1;
        }
        let duration_ms = run
            .completed_at
            .map(|end| (end - run.created_at).num_milliseconds());

        json!({
            "run_id": run.id,
            "status": run.status,
            "idea_chars": run.idea.chars().count(),
            "duration_ms": duration_ms,
            "total_attempts": run.stages.iter().map(|r| r.attempts).sum::<u32>(),
            "stage_counts": stage_counts,
            "stages": StageId::ALL
                .iter()
                .map(|stage| Self::build_stage_payload(run, *stage))
                .collect::<Vec<_>>(),
            "error": run.error,
            "cancel_reason": run.cancel_reason,
        })
    }

    /// Logs the wide event for a run.
    pub fn emit_run(&self, run: &Run) {
        let payload = Self::build_run_payload(run);
        tracing::info!(
            event_type = %self.event_type,
            run_id = %run.id,
            status = %run.status,
            payload = %payload,
            "Run summary"
        );
    }
}
