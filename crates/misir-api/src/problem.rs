//! RFC 9457 Problem Details error responses.
//!
//! Every handler error funnels through [`CoreError`]'s `kind()` slug into a
//! `application/problem+json` body, so API consumers get a stable `type`
//! field to match on instead of parsing prose.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use misir_core::{CoreError, StorageError};
use serde::Serialize;

const PROBLEM_TYPE_BASE: &str = "https://misir.dev/problems";

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

/// Wraps a [`CoreError`] so it can be returned directly from an axum handler.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError(CoreError::Storage(err))
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err.kind() {
        "not-found" => StatusCode::NOT_FOUND,
        "conflict" | "already-exists" => StatusCode::CONFLICT,
        "validation-error" | "invalid-range" | "invalid-dimension" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "forbidden" => StatusCode::FORBIDDEN,
        "embedding-service-error" | "external-service-error" | "configuration-error" => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let kind = self.0.kind();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, kind, "unhandled core error");
        } else {
            tracing::warn!(error = %self.0, kind, "request failed");
        }

        let body = ProblemDetails {
            problem_type: format!("{PROBLEM_TYPE_BASE}/{kind}"),
            title: kind.replace('-', " "),
            status: status.as_u16(),
            detail: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use misir_core::{CoreError, StorageError};

    #[test]
    fn not_found_maps_to_404() {
        let err = CoreError::Storage(StorageError::NotFound("space 1".into()));
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        let err = CoreError::Validation(misir_core::ValidationError::InvalidRange("bad".into()));
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }
}
