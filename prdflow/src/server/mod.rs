//! HTTP surface of the service.
//!
//! Every route is served at the root and again under `/api/v1`.

mod error;
mod routes;
mod views;

pub use error::{ApiError, ErrorBody};
pub use routes::MAX_LIST_LIMIT;
pub use views::{
    AgentProgress, CancelRequest, CreateRunRequest, CreatedRun, ListQuery, Progress, RunList, RunSummary, RunView,
};

use crate::assembler::{BundleWriter, ZipBundleWriter};
use crate::pipeline::Orchestrator;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Drives and queries runs.
    pub orchestrator: Arc<Orchestrator>,
    /// Serializes bundles for download.
    pub writer: Arc<dyn BundleWriter>,
}

impl AppState {
    /// Creates state that serves zip archives.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            writer: Arc::new(ZipBundleWriter::new()),
        }
    }

    /// Replaces the bundle writer.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn BundleWriter>) -> Self {
        self.writer = writer;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("writer", &self.writer.content_type())
            .finish()
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::service_info))
        .route("/health", get(routes::health))
        .route("/runs", post(routes::create_run).get(routes::list_runs))
        .route("/runs/{run_id}", get(routes::get_run))
        .route("/runs/{run_id}/cancel", post(routes::cancel_run))
        .route("/runs/{run_id}/download", get(routes::download))
        .route("/runs/{run_id}/artifacts/{kind}", get(routes::artifact))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Builds the application router.
///
/// An empty origin list allows any origin.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let api = api_routes();
    Router::new()
        .merge(api.clone())
        .nest("/api/v1", api)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router until the process is stopped.
///
/// # Errors
///
/// Returns the IO error that ended the accept loop.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Listening");
    }
    axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentInvoker, StubBackend};
    use crate::core::RunStatus;
    use crate::store::InMemoryRunStore;
    use crate::testing::completed_run;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn orchestrator() -> Arc<Orchestrator> {
        let store = Arc::new(InMemoryRunStore::new());
        let invoker = AgentInvoker::new(Arc::new(StubBackend::new()));
        Arc::new(Orchestrator::new(store, invoker))
    }

    fn app(orchestrator: &Arc<Orchestrator>) -> Router {
        router(AppState::new(Arc::clone(orchestrator)), &[])
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_for(orchestrator: &Orchestrator, id: &str, status: RunStatus) {
        for _ in 0..200 {
            let run = orchestrator.get_run(&id.into()).unwrap();
            if run.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {id} never reached {status}");
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(&orchestrator());
        let response = send(&app, get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "status": "ok" }));

        let response = send(&app, get("/api/v1/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_service_info_names_backend() {
        let app = app(&orchestrator());
        let body = json_body(send(&app, get("/")).await).await;
        assert_eq!(body["backend"], "stub");
        assert_eq!(body["agents"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_create_run_and_download() {
        let orchestrator = orchestrator();
        let app = app(&orchestrator);

        let response = send(
            &app,
            post_json("/runs", r#"{"product_idea": "A water intake tracker with reminders"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        let run_id = body["run_id"].as_str().unwrap().to_string();

        wait_for(&orchestrator, &run_id, RunStatus::Completed).await;

        let view = json_body(send(&app, get(&format!("/runs/{run_id}"))).await).await;
        assert_eq!(view["status"], "completed");
        assert_eq!(view["progress"]["completed"], 5);
        assert_eq!(view["agents"].as_array().unwrap().len(), 5);
        assert_eq!(view["download_url"], format!("/runs/{run_id}/download"));

        let response = send(&app, get(&format!("/runs/{run_id}/download"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/zip");
        let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\""));
        assert!(disposition.ends_with("-prd.zip\""));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"PK"));

        let response = send(&app, get(&format!("/api/v1/runs/{run_id}/artifacts/prd_markdown"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("# "));
    }

    #[tokio::test]
    async fn test_create_run_rejects_blank_idea() {
        let orchestrator = orchestrator();
        let app = app(&orchestrator);

        let response = send(&app, post_json("/runs", r#"{"idea": "   "}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "ValidationError");
        assert!(orchestrator.store().is_empty());

        let response = send(&app, post_json("/runs", "not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(orchestrator.store().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let app = app(&orchestrator());
        for uri in ["/runs/nope", "/runs/nope/download", "/runs/nope/artifacts/mockup_json"] {
            let response = send(&app, get(uri)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(json_body(response).await["error"], "NotFound");
        }
    }

    #[tokio::test]
    async fn test_download_of_unfinished_run_conflicts() {
        let orchestrator = orchestrator();
        let run = orchestrator.create_run("A budget planner").await.unwrap();
        let app = app(&orchestrator);

        let response = send(&app, get(&format!("/runs/{}/download", run.id))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "IncompleteRun");
    }

    #[tokio::test]
    async fn test_unknown_artifact_kind_is_not_found() {
        let orchestrator = orchestrator();
        let run = completed_run("A meditation timer");
        orchestrator.store().put(run.clone()).unwrap();
        let app = app(&orchestrator);

        let response = send(&app, get(&format!("/runs/{}/artifacts/slides", run.id))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, get(&format!("/runs/{}/artifacts/execution_plan", run.id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_cancel_pending_run_then_conflict() {
        let orchestrator = orchestrator();
        let run = orchestrator.create_run("A team task board").await.unwrap();
        let app = app(&orchestrator);
        let uri = format!("/runs/{}/cancel", run.id);

        let response = send(&app, post_json(&uri, r#"{"reason": "changed my mind"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["cancel_reason"], "changed my mind");

        let response = send(&app, post_json(&uri, "")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "InvalidTransition");
    }

    #[tokio::test]
    async fn test_list_runs_pages() {
        let orchestrator = orchestrator();
        for idea in ["first idea", "second idea", "third idea"] {
            orchestrator.create_run(idea).await.unwrap();
        }
        let app = app(&orchestrator);

        let body = json_body(send(&app, get("/runs?limit=2")).await).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["limit"], 2);
        assert_eq!(body["runs"].as_array().unwrap().len(), 2);

        let body = json_body(send(&app, get("/runs?limit=2&offset=2")).await).await;
        assert_eq!(body["runs"].as_array().unwrap().len(), 1);

        let response = send(&app, get("/runs?limit=abc")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
