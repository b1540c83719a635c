//! Settings API endpoint
//!
//! Provides POST /api/settings/model_api_key

use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Request payload for setting the model API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/settings/model_api_key handler
///
/// **Request:** `{"api_key": "your-key"}`
/// **Response:** `{"success": true, "message": "..."}`
///
/// **Behavior:**
/// 1. Validate key (non-empty, non-whitespace)
/// 2. Write to database (authoritative)
/// 3. Swap the live key used by model clients
/// 4. Sync to TOML (best-effort backup)
///
/// **Errors:**
/// - 400 Bad Request: Empty or whitespace-only key
/// - 500 Internal Server Error: Database write failure
pub async fn set_model_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }
    let key = payload.api_key.trim().to_string();

    crate::db::settings::set_model_api_key(&state.db, key.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    *state.api_key.write().await = Some(key.clone());
    info!("Model API key configured via settings endpoint");

    match &state.toml_path {
        Some(toml_path) => {
            let mut settings = HashMap::new();
            settings.insert(crate::db::settings::MODEL_API_KEY.to_string(), key);
            if let Err(e) = crate::config::sync_settings_to_toml(settings, toml_path).await {
                warn!("TOML sync failed (database write succeeded): {}", e);
            }
        }
        None => warn!("No TOML path configured, skipping settings write-back"),
    }

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: "Model API key configured successfully".to_string(),
    }))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/model_api_key", post(set_model_api_key))
}
