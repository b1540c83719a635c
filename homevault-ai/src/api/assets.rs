//! Asset record endpoints
//!
//! Every route is scoped by `user_id`; an asset of another user is a 404.

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::api::multipart::UploadForm;
use crate::models::{Asset, AssetUpdate};
use crate::services::{validate_file, DeleteOutcome};
use crate::{ApiError, ApiResult, AppState};

/// Served when stored bytes match no known signature
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// GET /users/:user_id/assets
///
/// Newest first.
pub async fn list_assets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Asset>>> {
    Ok(Json(state.assets.list(&user_id).await?))
}

/// Inventory totals for dashboards
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTotals {
    pub count: usize,
    pub total_value: f64,
}

/// GET /users/:user_id/inventory
pub async fn inventory_totals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<InventoryTotals>> {
    let (count, total_value) = state.assets.inventory_totals(&user_id).await?;
    Ok(Json(InventoryTotals { count, total_value }))
}

/// GET /users/:user_id/assets/:asset_id
pub async fn get_asset(
    State(state): State<AppState>,
    Path((user_id, asset_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Asset>> {
    state
        .assets
        .get(&user_id, asset_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Asset not found: {}", asset_id)))
}

/// PATCH /users/:user_id/assets/:asset_id
///
/// Partial edit; `createdAt` never changes, `updatedAt` always advances.
pub async fn update_asset(
    State(state): State<AppState>,
    Path((user_id, asset_id)): Path<(String, Uuid)>,
    Json(update): Json<AssetUpdate>,
) -> ApiResult<Json<Asset>> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    Ok(Json(state.assets.update(&user_id, asset_id, &update).await?))
}

/// DELETE /users/:user_id/assets/:asset_id
///
/// Deletes the record, then its image; a failed image delete is reported in
/// the body rather than as an error status.
pub async fn delete_asset(
    State(state): State<AppState>,
    Path((user_id, asset_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<DeleteOutcome>> {
    Ok(Json(state.assets.delete(&user_id, asset_id).await?))
}

/// POST /users/:user_id/assets/:asset_id/image
///
/// Multipart field `image`. Stores the image and points the record at it.
pub async fn upload_asset_image(
    State(state): State<AppState>,
    Path((user_id, asset_id)): Path<(String, Uuid)>,
    multipart: Multipart,
) -> ApiResult<Json<Asset>> {
    let mut form = UploadForm::read(multipart).await?;
    let image = form
        .take_file("image")
        .ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?;
    let accepted = validate_file(&image, &state.config.intake)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if state.assets.get(&user_id, asset_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Asset not found: {}", asset_id)));
    }

    let stored = state
        .assets
        .upload_image(&user_id, asset_id, image.bytes.to_vec(), accepted.mime_type)
        .await?;
    let asset = state.assets.attach_image(&user_id, asset_id, &stored).await?;

    info!(user_id = %user_id, asset_id = %asset_id, path = %stored.path, "Asset image uploaded");
    Ok(Json(asset))
}

/// GET /blobs/*path
///
/// Serves a stored image with a content type sniffed from its bytes.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.assets.blobs().read(&path).await?;
    let content_type = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE);

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

pub fn asset_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/assets", get(list_assets))
        .route("/users/:user_id/inventory", get(inventory_totals))
        .route(
            "/users/:user_id/assets/:asset_id",
            get(get_asset).patch(update_asset).delete(delete_asset),
        )
        .route("/users/:user_id/assets/:asset_id/image", post(upload_asset_image))
        .route("/blobs/*path", get(get_blob))
}
