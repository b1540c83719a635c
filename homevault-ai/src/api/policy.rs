//! Policy comparison endpoint

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::error;

use crate::api::multipart::UploadForm;
use crate::services::{PolicyError, PolicyReport};
use crate::{ApiError, AppState};

#[derive(Debug)]
pub enum AnalyzePolicyError {
    Form(ApiError),
    Policy(PolicyError),
}

impl IntoResponse for AnalyzePolicyError {
    fn into_response(self) -> Response {
        let err = match self {
            AnalyzePolicyError::Form(err) => return err.into_response(),
            AnalyzePolicyError::Policy(err) => err,
        };

        let mut body = json!({
            "error": err.to_string(),
            "code": err.code(),
        });
        if let Some(raw) = err.raw_response() {
            body["rawResponse"] = json!(raw);
        }
        (err.status(), Json(body)).into_response()
    }
}

/// POST /api/analyze-policy
///
/// Multipart fields `policy` (PDF or image) and `userId`.
pub async fn analyze_policy(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PolicyReport>, AnalyzePolicyError> {
    let mut form = UploadForm::read(multipart)
        .await
        .map_err(AnalyzePolicyError::Form)?;
    let document = form.take_file("policy");
    let user_id = form.field("userId").map(str::to_string);

    match state.policy.compare(user_id.as_deref(), document).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            if e.status().is_server_error() {
                error!(code = e.code(), "Policy analysis error: {}", e);
                state.record_error(e.to_string()).await;
            }
            Err(AnalyzePolicyError::Policy(e))
        }
    }
}

pub fn policy_routes() -> Router<AppState> {
    Router::new().route("/api/analyze-policy", post(analyze_policy))
}
