//! Error handling utilities for route handlers

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::db::StoreError;

/// Extension trait for logging recoverable errors
pub trait LogErr<T> {
    /// Log error with context at warn level and continue without the value
    fn warn_ok(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn warn_ok(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "{}", context);
                None
            }
        }
    }
}

/// Failures of the capture flow that end the request.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No image uploaded successfully")]
    NoImageUploaded,

    #[error("Malformed capture payload: {0}")]
    Malformed(String),

    #[error("Failed to spool upload: {0}")]
    Spool(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            CaptureError::NoImageUploaded => (
                StatusCode::BAD_REQUEST,
                json!({
                    "status": "error",
                    "message": "No image uploaded successfully",
                    "error": true,
                    "success": false,
                }),
            ),
            CaptureError::Malformed(details) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "status": "error",
                    "message": "Malformed capture payload",
                    "details": details,
                }),
            ),
            CaptureError::Spool(_) | CaptureError::Store(_) => {
                tracing::error!(error = %self, "Error handling capture");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "status": "error",
                        "message": "Failed to capture data",
                        "details": self.to_string(),
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
