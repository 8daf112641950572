//! Mapping of session errors onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::error::SessionError;

/// Error returned by HTTP handlers
#[derive(Debug)]
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::AlreadyExists(_) | SessionError::AlreadyRecording(_) => {
                StatusCode::CONFLICT
            }
            SessionError::InvalidMarker(_) | SessionError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            SessionError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Io { .. } | SessionError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = Json(serde_json::json!({
            "success": false,
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
