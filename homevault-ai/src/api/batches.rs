//! Batch upload endpoints
//!
//! A batch is accepted with 202 and processed in the background; progress is
//! polled here or streamed from `/batches/:batch_id/events`.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::api::multipart::UploadForm;
use crate::models::{BatchSession, BatchState, BatchSummary, FileOutcome};
use crate::services::IntakeSelection;
use crate::{ApiError, ApiResult, AppState};

/// Multipart field carrying the images of a batch (repeated)
const IMAGES_FIELD: &str = "images";

/// Response for POST /users/:user_id/batches
#[derive(Debug, Serialize)]
pub struct StartBatchResponse {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub total_files: usize,
    /// Files left out of the batch, with the reason
    pub rejected: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// Batch status
#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    pub user_id: String,
    pub state: BatchState,
    pub total_files: usize,
    pub files_completed: usize,
    pub percentage: f32,
    pub results: Vec<FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
}

impl From<BatchSession> for BatchStatusResponse {
    fn from(session: BatchSession) -> Self {
        Self {
            percentage: session.percentage(),
            elapsed_seconds: session.elapsed_seconds(),
            batch_id: session.batch_id,
            user_id: session.user_id,
            state: session.state,
            total_files: session.total_files,
            files_completed: session.files_completed,
            results: session.results,
            error_message: session.error_message,
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }
}

/// POST /users/:user_id/batches
///
/// Multipart, repeated `images` fields. Invalid files are left out and listed
/// in `rejected`; a batch with no valid file is a 400.
pub async fn start_batch(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<StartBatchResponse>)> {
    let mut form = UploadForm::read(multipart).await?;

    let mut selection = IntakeSelection::new(state.config.intake);
    let rejected: Vec<String> = selection
        .add_all(form.take_files(IMAGES_FIELD))
        .into_iter()
        .map(|e| e.to_string())
        .collect();

    if selection.is_empty() {
        let reason = if rejected.is_empty() {
            "No images provided".to_string()
        } else {
            format!("No valid images: {}", rejected.join("; "))
        };
        return Err(ApiError::BadRequest(reason));
    }

    let session = state.batches.start(&user_id, selection.into_files()).await?;

    info!(
        batch_id = %session.batch_id,
        user_id = %user_id,
        rejected = rejected.len(),
        "Batch accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(StartBatchResponse {
            batch_id: session.batch_id,
            state: session.state,
            total_files: session.total_files,
            rejected,
            started_at: session.started_at,
        }),
    ))
}

/// GET /batches/:batch_id
pub async fn get_batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchStatusResponse>> {
    let session = state
        .batches
        .status(batch_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Batch not found: {}", batch_id)))?;

    tracing::debug!(batch_id = %batch_id, state = ?session.state, "Status query");
    Ok(Json(session.into()))
}

/// GET /batches/:batch_id/summary
///
/// Once the batch is terminal, reading the summary releases its live handle.
pub async fn get_batch_summary(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchSummary>> {
    state
        .batches
        .take_summary(batch_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Batch not found: {}", batch_id)))
}

/// GET /users/:user_id/batches/active
///
/// Most recent unfinished batch, for restoring the progress indicator after a
/// reload. 404 when the user has none.
pub async fn get_active_batch(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<BatchStatusResponse>> {
    state
        .batches
        .active_for_user(&user_id)
        .await?
        .map(|session| Json(session.into()))
        .ok_or_else(|| ApiError::NotFound("No active batch".to_string()))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/batches", post(start_batch))
        .route("/users/:user_id/batches/active", get(get_active_batch))
        .route("/batches/:batch_id", get(get_batch_status))
        .route("/batches/:batch_id/summary", get(get_batch_summary))
}
