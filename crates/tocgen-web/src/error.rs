use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tocgen_core::{AdvanceError, WindowError};
use tocgen_ingest::IngestError;

/// An error rendered as `{"error": ...}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<AdvanceError> for ApiError {
    fn from(err: AdvanceError) -> Self {
        let status = match err {
            AdvanceError::NoSession => StatusCode::BAD_REQUEST,
            AdvanceError::Busy | AdvanceError::NothingLeft | AdvanceError::SessionReplaced => {
                StatusCode::CONFLICT
            }
            AdvanceError::Completion(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<WindowError> for ApiError {
    fn from(err: WindowError) -> Self {
        let status = match err {
            WindowError::EmptyText => StatusCode::UNPROCESSABLE_ENTITY,
            WindowError::InvalidParameter(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}
