//! Daemon and API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use trellis_engine::EngineError;
use trellis_store::StoreError;
use trellis_types::ValidationErrors;
use uuid::Uuid;

/// Result type for daemon lifecycle operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon-level errors (startup, configuration, serving).
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// API-surface errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The acting tenant/actor headers were not resolvable. Treated as a
    /// deployment fault of the fronting session layer, not a 4xx.
    #[error("tenant context missing: {0}")]
    TenantContextMissing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(message) => Self::NotFound(message),
            EngineError::Validation(errors) => Self::Validation(errors),
            EngineError::Store(StoreError::Conflict(message)) => Self::Conflict(message),
            EngineError::Store(StoreError::NotFound(message)) => Self::NotFound(message),
            EngineError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // The body was JSON but not the expected shape; the rejection
            // text carries the offending field path.
            JsonRejection::JsonDataError(err) => {
                Self::Validation(ValidationErrors::single("body", err.body_text()))
            }
            other => Self::BadRequest(other.body_text()),
        }
    }
}

/// Error envelope body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::TenantContextMissing(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TENANT_CONTEXT_MISSING",
            ),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let field_errors = match &self {
            ApiError::Validation(errors) => {
                let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for err in &errors.errors {
                    map.entry(err.field.clone()).or_default().push(err.message.clone());
                }
                Some(map)
            }
            _ => None,
        };

        let correlation_id = if status.is_server_error() {
            let id = Uuid::new_v4().to_string();
            tracing::error!(correlation_id = %id, error = %self, "api request failed");
            Some(id)
        } else {
            None
        };

        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            code: code.to_string(),
            field_errors,
            correlation_id,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_api_errors() {
        let err: ApiError = EngineError::NotFound("instance x".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError =
            EngineError::Store(StoreError::Conflict("referenced".to_string())).into();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err: ApiError =
            EngineError::Store(StoreError::Backend("down".to_string())).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn validation_body_groups_messages_per_field() {
        let mut errors = ValidationErrors::new();
        errors.push("steps", "duplicate step key `s1`");
        errors.push("steps", "duplicate field key `qty` in step `s1`");
        errors.push("name", "must not be empty");

        let response = ApiError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
