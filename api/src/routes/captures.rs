//! Capture endpoint (/api/capture)

use axum::{
    Form, Json, Router,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::services::capture::{self as capture_service, CaptureOutcome, CaptureReceipt};
use crate::services::error::CaptureError;
use crate::services::uploads::{self, CaptureSubmission};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/capture", post(capture))
}

// ============================================================================
// Payload extractor - multipart, JSON or url-encoded bodies
// ============================================================================

/// Extractor that reads a capture from any supported body encoding.
/// Multipart attachments are spooled to the configured upload directory.
pub struct CapturePayload(pub CaptureSubmission);

impl FromRequest<Arc<AppState>> for CapturePayload {
    type Rejection = CaptureError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let submission = if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| CaptureError::Malformed(e.body_text()))?;
            uploads::read_multipart(multipart, &state.upload_dir).await?
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|e| CaptureError::Malformed(e.body_text()))?;
            CaptureSubmission::from_json(body)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| CaptureError::Malformed(e.body_text()))?;
            CaptureSubmission::from_pairs(pairs)
        } else {
            CaptureSubmission::default()
        };

        Ok(CapturePayload(submission))
    }
}

#[derive(Serialize)]
struct CaptureSuccess {
    status: &'static str,
    message: &'static str,
    #[serde(flatten)]
    receipt: CaptureReceipt,
}

/// POST /api/capture - Upload the capture image(s) and store one record per address
///
/// A duplicate address is answered with 200 and `error: true`, not a 4xx.
async fn capture(
    State(state): State<Arc<AppState>>,
    CapturePayload(submission): CapturePayload,
) -> Result<Response, CaptureError> {
    let outcome =
        capture_service::ingest_capture(state.store.as_ref(), state.uploader.as_ref(), submission)
            .await?;

    Ok(match outcome {
        CaptureOutcome::Captured(receipt) => Json(CaptureSuccess {
            status: "success",
            message: "Data captured!",
            receipt,
        })
        .into_response(),
        CaptureOutcome::Duplicate => Json(json!({
            "message": "Data with this IpAddress already exists.",
            "error": true,
            "success": false,
        }))
        .into_response(),
    })
}
