//! Insurance policy comparison
//!
//! Sends a policy document together with the user's inventory to the model
//! and returns the model's coverage report as-is. No local gap computation,
//! no caching, no retries.

use axum::http::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{InventoryLine, PolicyAnalysis};
use crate::services::asset_persistence::AssetStore;
use crate::services::image_intake::IntakeFile;
use crate::services::prompts::policy_prompt;
use crate::services::vision_client::{extract_json_block, GenerativeModel, InlineData, ModelError};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("No policy file provided")]
    MissingFile,

    #[error("User ID is required")]
    MissingUserId,

    #[error("Unsupported file type")]
    UnsupportedFileType(String),

    #[error("Failed to parse policy analysis")]
    UnparsableResponse { raw: String },

    #[error("Failed to analyze policy document: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to load inventory: {0}")]
    Store(#[from] homevault_common::Error),
}

impl PolicyError {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::MissingFile => "MISSING_FILE",
            PolicyError::MissingUserId => "MISSING_USER_ID",
            PolicyError::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            PolicyError::UnparsableResponse { .. } => "UNPARSABLE_RESPONSE",
            PolicyError::Model(_) => "MODEL_ERROR",
            PolicyError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PolicyError::MissingFile
            | PolicyError::MissingUserId
            | PolicyError::UnsupportedFileType(_) => StatusCode::BAD_REQUEST,
            PolicyError::UnparsableResponse { .. } | PolicyError::Model(_) => {
                StatusCode::BAD_GATEWAY
            }
            PolicyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Raw model text, for unparsable responses
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            PolicyError::UnparsableResponse { raw } => Some(raw),
            _ => None,
        }
    }
}

/// Successful comparison
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub success: bool,
    pub analysis: PolicyAnalysis,
    pub inventory_count: usize,
    pub inventory_value: f64,
}

/// MIME type forwarded to the model, if the document is acceptable
fn document_mime(file: &IntakeFile) -> Result<String, PolicyError> {
    let mime = file.effective_mime();
    if mime == "application/pdf" || mime.starts_with("image/") {
        Ok(mime)
    } else {
        Err(PolicyError::UnsupportedFileType(mime))
    }
}

#[derive(Clone)]
pub struct PolicyComparator {
    model: Arc<dyn GenerativeModel>,
    assets: AssetStore,
}

impl PolicyComparator {
    pub fn new(model: Arc<dyn GenerativeModel>, assets: AssetStore) -> Self {
        Self { model, assets }
    }

    /// Compare a policy document against a user's inventory
    ///
    /// The file is checked before the user id, then the inventory is loaded.
    pub async fn compare(
        &self,
        user_id: Option<&str>,
        document: Option<IntakeFile>,
    ) -> Result<PolicyReport, PolicyError> {
        let document = document
            .filter(|d| !d.bytes.is_empty())
            .ok_or(PolicyError::MissingFile)?;
        let user_id = user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(PolicyError::MissingUserId)?;
        let mime_type = document_mime(&document)?;

        let assets = self.assets.list(user_id).await?;
        let inventory_value: f64 = assets.iter().map(|a| a.estimated_value.amount).sum();
        let inventory: Vec<InventoryLine> = assets.iter().map(InventoryLine::from).collect();

        info!(
            user_id,
            document = %document.name,
            mime_type = %mime_type,
            inventory_count = inventory.len(),
            inventory_value,
            "Comparing policy against inventory"
        );

        let raw = self
            .model
            .generate(
                &policy_prompt(inventory_value, &inventory),
                InlineData {
                    mime_type,
                    data: document.bytes.clone(),
                },
            )
            .await?;

        let analysis: PolicyAnalysis = extract_json_block(&raw)
            .and_then(|json| serde_json::from_str(json).ok())
            .ok_or_else(|| {
                warn!(user_id, "No parsable JSON in policy analysis response");
                PolicyError::UnparsableResponse { raw: raw.clone() }
            })?;

        if !analysis.coverage_analysis.is_consistent(inventory_value) {
            warn!(
                user_id,
                total_covered = analysis.coverage_analysis.total_covered,
                total_uncovered = analysis.coverage_analysis.total_uncovered,
                inventory_value,
                "Model coverage figures do not add up"
            );
        }

        Ok(PolicyReport {
            success: true,
            analysis,
            inventory_count: assets.len(),
            inventory_value,
        })
    }
}
