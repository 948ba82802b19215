use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use vendsync_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::TargetNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::IntegrityConflict(_) => (StatusCode::CONFLICT, "integrity_conflict"),
            AppError::AuthenticationFailure { .. } => {
                (StatusCode::BAD_GATEWAY, "authentication_failure")
            }
            AppError::SerializationError(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// A 400 for requests that are well-formed JSON but make no sense.
    pub fn bad_request(message: impl Into<String>) -> Response {
        let body = ErrorResponse {
            error: "validation_error".to_string(),
            message: message.into(),
        };
        (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
