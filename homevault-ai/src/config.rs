//! Configuration resolution for homevault-ai
//!
//! Service settings resolve CLI (with env fallbacks) → TOML → compiled
//! defaults. The model API key resolves Database → ENV → TOML so a key saved
//! through the settings endpoint always wins.

use clap::Parser;
use homevault_common::config::{load_toml_config, write_toml_config, TomlConfig};
use homevault_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::db::assets::DuplicateWindow;
use crate::services::image_intake::IntakeLimits;

/// Module name used for the TOML file and logging
pub const MODULE_NAME: &str = "homevault-ai";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5740;

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variable holding the model API key
pub const MODEL_API_KEY_ENV: &str = "HOMEVAULT_MODEL_API_KEY";

pub const DEFAULT_MODEL_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_POLICY_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_MODEL_REQUESTS_PER_MINUTE: u32 = 60;

/// How long a finished batch stays observable in memory
pub const DEFAULT_BATCH_RETENTION: Duration = Duration::from_secs(600);

/// Command-line arguments for homevault-ai
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "homevault-ai")]
#[command(about = "Household asset analysis service for HomeVault")]
#[command(version)]
pub struct CliArgs {
    /// Root folder holding the database and stored images
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "HOMEVAULT_AI_PORT")]
    pub port: Option<u16>,

    /// Host/interface to bind
    #[arg(long, env = "HOMEVAULT_AI_HOST")]
    pub host: Option<String>,

    /// Base URL under which stored images are publicly reachable
    #[arg(long, env = "HOMEVAULT_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Generative model REST base URL
    #[arg(long, env = "HOMEVAULT_MODEL_BASE_URL")]
    pub model_base_url: Option<String>,

    /// Files analyzed concurrently within one batch
    #[arg(long, env = "HOMEVAULT_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,
}

/// Resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// No trailing slash
    pub public_base_url: String,
    pub model_base_url: String,
    pub image_model: String,
    pub policy_model: String,
    pub model_requests_per_minute: u32,
    /// Files analyzed concurrently within one batch (1 = strictly sequential)
    pub max_concurrency: usize,
    pub intake: IntakeLimits,
    pub duplicate_window: DuplicateWindow,
    pub event_bus_capacity: usize,
    /// Finished batches are dropped from memory after this; status then comes from the database
    pub batch_retention: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_base_url: format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            policy_model: DEFAULT_POLICY_MODEL.to_string(),
            model_requests_per_minute: DEFAULT_MODEL_REQUESTS_PER_MINUTE,
            max_concurrency: 1,
            intake: IntakeLimits::default(),
            duplicate_window: DuplicateWindow::default(),
            event_bus_capacity: 100,
            batch_retention: DEFAULT_BATCH_RETENTION,
        }
    }
}

impl ServiceConfig {
    /// Merge CLI arguments over TOML values over defaults
    pub fn resolve(cli: &CliArgs, toml: &TomlConfig) -> Self {
        let defaults = Self::default();

        let host = cli
            .host
            .clone()
            .or_else(|| toml.host.clone())
            .unwrap_or(defaults.host);
        let port = cli.port.or(toml.port).unwrap_or(defaults.port);
        let public_base_url = cli
            .public_base_url
            .clone()
            .or_else(|| toml.public_base_url.clone())
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            host,
            port,
            model_base_url: cli
                .model_base_url
                .clone()
                .or_else(|| toml.model_base_url.clone())
                .unwrap_or(defaults.model_base_url)
                .trim_end_matches('/')
                .to_string(),
            image_model: toml.model_name.clone().unwrap_or(defaults.image_model),
            policy_model: toml
                .policy_model_name
                .clone()
                .unwrap_or(defaults.policy_model),
            max_concurrency: cli
                .max_concurrency
                .or(toml.max_concurrency)
                .unwrap_or(defaults.max_concurrency)
                .max(1),
            ..defaults
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolve the model API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
///
/// A missing key is not fatal: the service starts and analysis requests fail
/// until a key is configured through `POST /api/settings/model_api_key`.
pub async fn resolve_model_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_model_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(MODEL_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .model_api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Model API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Model API key loaded from database");
        return Ok(Some(key));
    }
    if let Some(key) = env_key {
        info!("Model API key loaded from environment variable");
        return Ok(Some(key));
    }
    if let Some(key) = toml_key {
        info!("Model API key loaded from TOML config");
        return Ok(Some(key));
    }

    warn!(
        "Model API key not configured. Configure using one of:\n\
         1. POST /api/settings/model_api_key\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: model_api_key = \"your-key\"",
        MODEL_API_KEY_ENV
    );
    Ok(None)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Sync settings from database to TOML file
///
/// Known keys: "model_api_key". A failed write is logged, never returned:
/// the database stays authoritative.
pub async fn sync_settings_to_toml(
    settings: HashMap<String, String>,
    toml_path: &Path,
) -> Result<()> {
    let mut config = if toml_path.exists() {
        load_toml_config(toml_path)?
    } else {
        TomlConfig::default()
    };

    if let Some(key) = settings.get(crate::db::settings::MODEL_API_KEY) {
        config.model_api_key = Some(key.clone());
    }

    match write_toml_config(&config, toml_path) {
        Ok(()) => {
            info!("Settings synced to TOML: {}", toml_path.display());
            Ok(())
        }
        Err(e) => {
            warn!("TOML write failed (database write succeeded): {}", e);
            Ok(())
        }
    }
}

/// TOML path for this service, if a config directory exists
pub fn toml_path() -> Result<PathBuf> {
    homevault_common::config::config_file_path(MODULE_NAME)
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}
