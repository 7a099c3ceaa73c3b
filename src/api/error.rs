//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::types::ApiResponse;
use crate::error::MonitoringError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body, failed validation or a state conflict
    InvalidRequest(String),

    /// Resource not found
    NotFound(String),

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

impl From<MonitoringError> for ApiError {
    fn from(err: MonitoringError) -> Self {
        let message = err.to_string();
        match err {
            MonitoringError::TaskNotFound(_) | MonitoringError::StatusNotFound(_) => {
                ApiError::NotFound(message)
            }
            MonitoringError::TaskExists(_)
            | MonitoringError::AlreadyRunning(_)
            | MonitoringError::NotRunning(_)
            | MonitoringError::InvalidTask(_) => ApiError::InvalidRequest(message),
            MonitoringError::AutoStartTimeout
            | MonitoringError::Device(_)
            | MonitoringError::SerializationError(_)
            | MonitoringError::IoError(_) => ApiError::Internal(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
