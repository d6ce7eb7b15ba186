//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::http::response::ApiResponse;

/// Trigger outcomes that are answered with an error envelope.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed.
    Forbidden(String),
    /// The payload could not be interpreted.
    Malformed(String),
    /// The worker could not be reached or refused the run.
    DispatchFailed(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Malformed(_) => StatusCode::BAD_REQUEST,
            AppError::DispatchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Malformed(_) => "MALFORMED_PAYLOAD",
            AppError::DispatchFailed(_) => "DISPATCH_FAILED",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Forbidden(msg) | AppError::Malformed(msg) | AppError::DispatchFailed(msg) => msg,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let body = ApiResponse::error(self.code(), self.message(), request_id, 0);
        (self.status(), Json(body)).into_response()
    }
}
