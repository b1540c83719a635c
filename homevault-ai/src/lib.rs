//! homevault-ai library interface
//!
//! Exposes the service state and router for the binary and integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use homevault_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::services::{
    AssetStore, BatchOrchestrator, BatchRegistry, BlobStore, GenerativeModel, PolicyComparator,
    SharedApiKey, VisionClient,
};

/// Multipart overhead allowed on top of the file payload
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Collaborators the state is assembled from
pub struct StateParts {
    pub db: SqlitePool,
    pub config: ServiceConfig,
    pub blobs: BlobStore,
    /// Model used for item photos
    pub image_model: Arc<dyn GenerativeModel>,
    /// Model used for policy documents
    pub policy_model: Arc<dyn GenerativeModel>,
    pub api_key: SharedApiKey,
    pub max_lock_wait_ms: u64,
    /// TOML file the settings endpoint writes back to (`None` disables write-back)
    pub toml_path: Option<PathBuf>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub config: Arc<ServiceConfig>,
    /// Live model API key
    pub api_key: SharedApiKey,
    pub vision: VisionClient,
    pub assets: AssetStore,
    pub batches: BatchOrchestrator,
    pub policy: PolicyComparator,
    pub toml_path: Option<PathBuf>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(parts: StateParts) -> Self {
        let StateParts {
            db,
            config,
            blobs,
            image_model,
            policy_model,
            api_key,
            max_lock_wait_ms,
            toml_path,
        } = parts;

        let event_bus = EventBus::new(config.event_bus_capacity);
        let vision = VisionClient::new(image_model);
        let assets = AssetStore::new(
            db.clone(),
            blobs,
            event_bus.clone(),
            config.duplicate_window,
            max_lock_wait_ms,
        );
        let batches = BatchOrchestrator::new(
            db.clone(),
            event_bus.clone(),
            vision.clone(),
            assets.clone(),
            BatchRegistry::new(),
            config.max_concurrency,
            config.batch_retention,
            max_lock_wait_ms,
        );
        let policy = PolicyComparator::new(policy_model, assets.clone());

        Self {
            db,
            event_bus,
            config: Arc::new(config),
            api_key,
            vision,
            assets,
            batches,
            policy,
            toml_path,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an upstream failure for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.intake.max_files * state.config.intake.max_file_bytes
        + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api::analyze_routes())
        .merge(api::asset_routes())
        .merge(api::batch_routes())
        .merge(api::policy_routes())
        .merge(api::event_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
