//! Response bodies.

use crate::core::{Run, RunId, RunStatus, StageId, StageResult, StageStatus};
use crate::stages;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};

/// Body of `POST /runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    /// The product idea.
    #[serde(alias = "idea")]
    pub product_idea: String,
}

/// Body of `POST /runs/{run_id}/cancel`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    /// Optional reason recorded on the run.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query of `GET /runs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Page size.
    pub limit: Option<usize>,
    /// Number of runs to skip.
    pub offset: Option<usize>,
}

/// Response of `POST /runs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedRun {
    /// The new run.
    pub run_id: RunId,
    /// Its status at creation.
    pub status: RunStatus,
}

/// One entry of the agent progress list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProgress {
    /// Stage identifier.
    pub stage: StageId,
    /// Display name of the agent.
    pub name: String,
    /// Stage status; `idle` when not started.
    pub status: StageStatus,
    /// Agent calls made.
    pub attempts: u32,
    /// Recorded failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Overall progress counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    /// Completed stages.
    pub completed: usize,
    /// Stages in the pipeline.
    pub total: usize,
}

/// Full view of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunView {
    /// Run identifier.
    pub run_id: RunId,
    /// Submitted idea.
    pub idea: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Progress counter.
    pub progress: Progress,
    /// One entry per pipeline stage, in order.
    pub agents: Vec<AgentProgress>,
    /// Started stage results, in order.
    pub stages: Vec<StageResult>,
    /// Run-level failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reason given on cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update.
    pub updated_at: Timestamp,
    /// Terminal time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Archive location once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl From<&Run> for RunView {
    fn from(run: &Run) -> Self {
        let agents = StageId::ALL
            .iter()
            .map(|stage| {
                let result = run.stage_result(*stage);
                AgentProgress {
                    stage: *stage,
                    name: stages::definition(*stage)
                        .map_or_else(|| stage.to_string(), |d| d.display_name.to_string()),
                    status: run.stage_status(*stage),
                    attempts: result.map_or(0, |r| r.attempts),
                    error: result.and_then(|r| r.error.clone()),
                }
            })
            .collect();

        Self {
            run_id: run.id.clone(),
            idea: run.idea.clone(),
            status: run.status,
            progress: Progress {
                completed: run.stages.iter().filter(|r| r.is_completed()).count(),
                total: StageId::ALL.len(),
            },
            agents,
            stages: run.stages.clone(),
            error: run.error.clone(),
            cancel_reason: run.cancel_reason.clone(),
            created_at: run.created_at,
            updated_at: run.updated_at,
            completed_at: run.completed_at,
            download_url: (run.status == RunStatus::Completed)
                .then(|| format!("/runs/{}/download", run.id)),
        }
    }
}

/// Compact entry of `GET /runs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: RunId,
    /// Submitted idea.
    pub idea: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Completed stages.
    pub completed_stages: usize,
    /// Creation time.
    pub created_at: Timestamp,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id.clone(),
            idea: run.idea.clone(),
            status: run.status,
            completed_stages: run.stages.iter().filter(|r| r.is_completed()).count(),
            created_at: run.created_at,
        }
    }
}

/// Response of `GET /runs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunList {
    /// The page of runs, newest first.
    pub runs: Vec<RunSummary>,
    /// Total stored runs.
    pub total: usize,
    /// Applied page size.
    pub limit: usize,
    /// Applied offset.
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::partial_run;

    #[test]
    fn test_run_view_lists_all_five_agents() {
        let run = partial_run("A budget planner", 2);
        let view = RunView::from(&run);

        assert_eq!(view.agents.len(), 5);
        assert_eq!(view.progress, Progress { completed: 2, total: 5 });
        assert_eq!(view.agents[1].status, StageStatus::Completed);
        assert_eq!(view.agents[2].status, StageStatus::Idle);
        assert_eq!(view.agents[4].attempts, 0);
        assert!(view.download_url.is_none());
    }

    #[test]
    fn test_create_request_accepts_alias() {
        let req: CreateRunRequest = serde_json::from_str(r#"{"idea": "x"}"#).unwrap();
        assert_eq!(req.product_idea, "x");
        let req: CreateRunRequest = serde_json::from_str(r#"{"product_idea": "y"}"#).unwrap();
        assert_eq!(req.product_idea, "y");
    }
}
