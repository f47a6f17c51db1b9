use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use platen_store::StoreError;
use platen_workers::SubmitError;
use serde_json::json;
use thiserror::Error;

/// Error surface of the HTTP layer.
///
/// Each variant maps to one status code; the body is always
/// `{"detail": "..."}` so clients have a single shape to parse.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed submission (400)
    #[error("{message}")]
    BadRequest { message: String },

    /// Unknown task id or artifact (404)
    #[error("{message}")]
    NotFound { message: String },

    /// Queue at capacity (503)
    #[error("{message}")]
    ServiceUnavailable { message: String },

    /// Anything unexpected (500)
    #[error("{message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } => "bad_request",
            ApiError::NotFound { .. } => "not_found",
            ApiError::ServiceUnavailable { .. } => "service_unavailable",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                tracing::error!(error_type = self.error_type(), message = %message, "API error");
            }
            _ => {
                tracing::warn!(error_type = self.error_type(), message = %message, "Client error");
            }
        }

        (status, Json(json!({ "detail": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::not_found("Task ID not found"),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::QueueFull => {
                ApiError::unavailable("Server too busy, please try again later")
            }
            SubmitError::Store(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_expected_status_codes() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_not_found_becomes_task_id_not_found() {
        let err: ApiError = StoreError::NotFound("abc".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Task ID not found");
    }

    #[test]
    fn queue_full_becomes_busy_503() {
        let err: ApiError = SubmitError::QueueFull.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Server too busy, please try again later");
    }
}
