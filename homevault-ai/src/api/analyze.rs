//! Single-image analysis endpoint
//!
//! Analysis only: nothing is persisted. Errors use a flat
//! `{ "error": ..., "details": ... }` body.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use crate::api::multipart::UploadForm;
use crate::services::{validate_file, AnalysisError, IntakeError};
use crate::{ApiError, AppState};

/// Failure of `POST /api/analyze-image`
#[derive(Debug)]
pub enum AnalyzeImageError {
    Form(ApiError),
    MissingImage,
    Rejected(IntakeError),
    Failed(AnalysisError),
}

impl IntoResponse for AnalyzeImageError {
    fn into_response(self) -> Response {
        match self {
            AnalyzeImageError::Form(err) => err.into_response(),
            AnalyzeImageError::MissingImage => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No image provided" })),
            )
                .into_response(),
            AnalyzeImageError::Rejected(IntakeError::UnsupportedType { name, content_type }) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!(
                        "Unsupported image format: {}. Please use JPG, PNG, WEBP, or HEIC.",
                        content_type
                    ),
                    "receivedType": content_type,
                    "fileName": name,
                })),
            )
                .into_response(),
            AnalyzeImageError::Rejected(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            AnalyzeImageError::Failed(err) => {
                let status = match err {
                    AnalysisError::UnsupportedType(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    Json(json!({
                        "error": "Failed to analyze image",
                        "details": err.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// POST /api/analyze-image
///
/// Multipart field `image`. Returns the item analysis JSON.
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AnalyzeImageError> {
    let mut form = UploadForm::read(multipart)
        .await
        .map_err(AnalyzeImageError::Form)?;
    let image = form.take_file("image").ok_or(AnalyzeImageError::MissingImage)?;

    info!(
        file = %image.name,
        content_type = %image.content_type,
        size = image.size(),
        "Received image analysis request"
    );

    validate_file(&image, &state.config.intake).map_err(AnalyzeImageError::Rejected)?;

    match state.vision.analyze(&image).await {
        Ok(analysis) => Ok(Json(analysis).into_response()),
        Err(e) => {
            error!(file = %image.name, "Image analysis error: {}", e);
            state.record_error(e.to_string()).await;
            Err(AnalyzeImageError::Failed(e))
        }
    }
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/api/analyze-image", post(analyze_image))
}
