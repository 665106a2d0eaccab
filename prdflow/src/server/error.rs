//! Mapping of service errors onto HTTP responses.

use crate::errors::PrdflowError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// JSON error body: `{ "error": code, "message": ... }`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Stable error code.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// An error returned from a handler.
#[derive(Debug)]
pub struct ApiError(pub PrdflowError);

impl ApiError {
    /// Returns the HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PrdflowError::Validation(_) => StatusCode::BAD_REQUEST,
            PrdflowError::NotFound(_) => StatusCode::NOT_FOUND,
            PrdflowError::IncompleteRun { .. }
            | PrdflowError::InvalidTransition { .. }
            | PrdflowError::Cancelled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PrdflowError> for ApiError {
    fn from(err: PrdflowError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PrdflowError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(PrdflowError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }
        let body = ErrorBody {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
