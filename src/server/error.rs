// src/server/error.rs

use crate::error::NilaSsoError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// An error response of the auth API.
///
/// Rendered as `{"isValid": false, "error": "..."}` so clients read every
/// rejection the same way.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    is_valid: bool,
    error: String,
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

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<NilaSsoError> for ApiError {
    fn from(err: NilaSsoError) -> Self {
        match err {
            NilaSsoError::UnsupportedProvider(_) => ApiError::bad_request(err.to_string()),
            other => {
                error!(error = %other, "Unexpected fault while validating token");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            is_valid: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
