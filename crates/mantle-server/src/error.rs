//! Unified error handling for the IPC router

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error response body
#[derive(Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
}

/// Router-level error types
pub enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (
            status,
            Json(ApiError {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}
