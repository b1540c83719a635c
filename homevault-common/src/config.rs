//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`HOMEVAULT_ROOT_FOLDER`, then `HOMEVAULT_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: the service logs a
//! warning and starts with compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "homevault.db";

/// Blob storage directory inside the root folder
pub const BLOB_DIR_NAME: &str = "blobs";

/// Environment variables consulted for the root folder, in priority order
pub const ROOT_FOLDER_ENV_VARS: [&str; 2] = ["HOMEVAULT_ROOT_FOLDER", "HOMEVAULT_ROOT"];

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: get_default_root_folder(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bootstrap configuration loaded from `<config dir>/homevault/<module>.toml`
///
/// Every field is optional; absent values fall through to environment
/// variables or compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and blob store
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP bind host
    #[serde(default)]
    pub host: Option<String>,

    /// HTTP port
    #[serde(default)]
    pub port: Option<u16>,

    /// Base URL under which stored images are publicly reachable
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Generative model API key
    #[serde(default)]
    pub model_api_key: Option<String>,

    /// Generative model used for item photos (e.g. "gemini-1.5-pro")
    #[serde(default)]
    pub model_name: Option<String>,

    /// Generative model used for policy documents (e.g. "gemini-1.5-flash")
    #[serde(default)]
    pub policy_model_name: Option<String>,

    /// Generative model REST base URL
    #[serde(default)]
    pub model_base_url: Option<String>,

    /// Upper bound on files analyzed concurrently within one batch
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl TomlConfig {
    /// Load TOML config for a module, falling back to defaults on any problem
    pub fn load_or_default(module_name: &str) -> Self {
        match config_file_path(module_name) {
            Some(path) if path.exists() => match load_toml_config(&path) {
                Ok(config) => {
                    info!("Loaded TOML configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring unreadable TOML config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Some(path) => {
                warn!(
                    "No TOML config at {} - using defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("Could not determine config directory - using defaults");
                Self::default()
            }
        }
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML config file atomically (write temp file, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Path of the per-module TOML config file
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("homevault").join(format!("{}.toml", module_name)))
}

/// Standard User-Agent for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!(
        "HomeVault/{} (https://github.com/homevault/homevault)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/homevault
        dirs::data_local_dir()
            .map(|d| d.join("homevault"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/homevault"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("homevault"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/homevault"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("homevault"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\homevault"))
    } else {
        PathBuf::from("./homevault_data")
    }
}

/// Resolves the root folder following the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_override: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_override: None,
            toml_root: None,
        }
    }

    pub fn with_cli_override(mut self, path: Option<PathBuf>) -> Self {
        self.cli_override = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_override {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        for var in ROOT_FOLDER_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    info!(module = %self.module_name, "Root folder from {}: {}", var, value);
                    return PathBuf::from(value);
                }
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML: {}", path.display());
            return path.clone();
        }

        let default = CompiledDefaults::for_current_platform().root_folder;
        info!(module = %self.module_name, "Root folder (compiled default): {}", default.display());
        default
    }
}

/// Creates the root folder layout on first run
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.blob_root())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn blob_root(&self) -> PathBuf {
        self.root_folder.join(BLOB_DIR_NAME)
    }
}
