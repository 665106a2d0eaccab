//! Request handlers.

use super::error::ApiError;
use super::views::{CancelRequest, CreateRunRequest, CreatedRun, ListQuery, RunList, RunSummary, RunView};
use super::AppState;
use crate::assembler::ArtifactKind;
use crate::core::{RunId, StageId};
use crate::errors::PrdflowError;
use crate::stages;
use crate::store::DEFAULT_LIST_LIMIT;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

/// Largest page `GET /runs` returns.
pub const MAX_LIST_LIMIT: usize = 100;

pub(crate) async fn service_info(State(state): State<AppState>) -> Json<Value> {
    let agents: Vec<Value> = StageId::ALL
        .iter()
        .filter_map(|stage| stages::definition(*stage))
        .map(|def| json!({ "stage": def.id, "name": def.display_name }))
        .collect();
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.orchestrator.backend_name(),
        "agents": agents,
        "artifacts": ArtifactKind::ALL.iter().map(ArtifactKind::as_str).collect::<Vec<_>>(),
    }))
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn create_run(
    State(state): State<AppState>,
    payload: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedRun>), ApiError> {
    let Json(request) = payload?;
    let run = state.orchestrator.start_run(&request.product_idea).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CreatedRun {
            run_id: run.id,
            status: run.status,
        }),
    ))
}

pub(crate) async fn list_runs(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<RunList>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let runs = state.orchestrator.list_runs(limit, offset);
    Ok(Json(RunList {
        runs: runs.iter().map(RunSummary::from).collect(),
        total: state.orchestrator.store().len(),
        limit,
        offset,
    }))
}

pub(crate) async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunView>, ApiError> {
    let run = state.orchestrator.get_run(&RunId::from(run_id))?;
    Ok(Json(RunView::from(&run)))
}

pub(crate) async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    body: Bytes,
) -> Result<Json<RunView>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest::default()
    } else {
        serde_json::from_slice::<CancelRequest>(&body)
            .map_err(|e| PrdflowError::validation(format!("invalid cancel request: {e}")))?
    };
    let run = state
        .orchestrator
        .cancel_run(&RunId::from(run_id), request.reason.as_deref())
        .await?;
    Ok(Json(RunView::from(&run)))
}

pub(crate) async fn download(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bundle = state.orchestrator.bundle(&RunId::from(run_id))?;
    let bytes = state.writer.write(&bundle)?;
    let disposition = format!(
        "attachment; filename=\"{}-prd.{}\"",
        file_stem(&bundle.product_name),
        state.writer.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, state.writer.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

pub(crate) async fn artifact(
    State(state): State<AppState>,
    Path((run_id, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: ArtifactKind = kind.parse().map_err(PrdflowError::NotFound)?;
    let bundle = state.orchestrator.bundle(&RunId::from(run_id))?;
    let bytes = bundle.artifact_bytes(kind)?;
    Ok(([(header::CONTENT_TYPE, kind.content_type())], bytes))
}

/// Lowercase ASCII file stem for a product name, `prd` if nothing survives.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.is_empty() && !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_end_matches('-');
    if stem.is_empty() {
        "prd".to_string()
    } else {
        stem.to_string()
    }
}
