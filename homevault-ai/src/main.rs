//! homevault-ai - Household asset analysis service
//!
//! Accepts photos of household items, has a generative vision model identify
//! and value them, stores the resulting asset records and images, and compares
//! insurance policies against the catalogued inventory.

use anyhow::{Context, Result};
use clap::Parser;
use homevault_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homevault_ai::config::{self, CliArgs, ServiceConfig, MODULE_NAME};
use homevault_ai::services::{BlobStore, GeminiModel, GenerativeModel};
use homevault_ai::{AppState, StateParts};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let toml_config = TomlConfig::load_or_default(MODULE_NAME);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "homevault_ai={0},homevault_common={0},tower_http=info",
                    toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting {} v{} [{}] built {} ({})",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: Resolve root folder (CLI → ENV → TOML → default)
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_override(args.root_folder.clone())
        .with_toml(&toml_config)
        .resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", initializer.root_folder().display());

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = homevault_ai::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let service_config = ServiceConfig::resolve(&args, &toml_config);
    let max_lock_wait_ms = homevault_ai::db::settings::get_max_lock_wait_ms(&db_pool).await?;

    // Missing key is not fatal: analysis fails until one is configured
    let api_key = Arc::new(RwLock::new(
        config::resolve_model_api_key(&db_pool, &toml_config).await?,
    ));

    let image_model = GeminiModel::new(
        &service_config.model_base_url,
        &service_config.image_model,
        service_config.model_requests_per_minute,
        Arc::clone(&api_key),
    )?;
    let policy_model = GeminiModel::new(
        &service_config.model_base_url,
        &service_config.policy_model,
        service_config.model_requests_per_minute,
        Arc::clone(&api_key),
    )?;
    info!(
        image_model = image_model.model_name(),
        policy_model = policy_model.model_name(),
        max_concurrency = service_config.max_concurrency,
        "Model clients initialized"
    );
    let image_model: Arc<dyn GenerativeModel> = Arc::new(image_model);
    let policy_model: Arc<dyn GenerativeModel> = Arc::new(policy_model);

    let blob_root = initializer.blob_root();
    let blobs = BlobStore::fs(&blob_root, &service_config.public_base_url)
        .with_context(|| format!("Failed to open blob store at {}", blob_root.display()))?;
    info!("Blob store: {}", blob_root.display());

    let toml_path = match config::toml_path() {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Settings write-back disabled: {}", e);
            None
        }
    };

    let bind_address = service_config.bind_address();
    let state = AppState::new(StateParts {
        db: db_pool,
        config: service_config,
        blobs,
        image_model,
        policy_model,
        api_key,
        max_lock_wait_ms,
        toml_path,
    });
    let app = homevault_ai::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
