//! Configuration loading
//!
//! Resolution order for the config file:
//! 1. Command-line `--config` path (highest priority)
//! 2. `LABTRACK_CONFIG` environment variable
//! 3. `<config dir>/labtrack/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing or unreadable file never stops the client: it logs a warning
//! and continues with defaults. `LABTRACK_API_URL` overrides the API base
//! URL whichever file was used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LABTRACK_CONFIG";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV_VAR: &str = "LABTRACK_API_URL";

/// Client configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST backend
    pub api_base_url: String,

    /// JSON file holding persisted auth artifacts
    ///
    /// Default: `<local data dir>/labtrack/session.json`
    pub storage_path: Option<PathBuf>,

    pub upload: UploadConfig,
    pub processing: ProcessingConfig,
    pub guard: GuardConfig,
    pub social: SocialConfig,
    pub logging: LoggingConfig,
}

/// Upload validation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size in megabytes
    pub max_size_mb: u64,

    /// Accepted MIME types
    pub allowed_types: Vec<String>,
}

/// Simulated processing cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Progress increment per tick (percent)
    pub progress_step: u8,

    /// Delay between ticks in milliseconds
    pub step_interval_ms: u64,
}

/// Route guard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Path prefixes that require an authenticated session
    pub protected_prefixes: Vec<String>,

    /// Where unauthenticated users are sent
    pub sign_in_path: String,
}

/// Social login providers: name → authorize URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub providers: BTreeMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5780".to_string(),
            storage_path: None,
            upload: UploadConfig::default(),
            processing: ProcessingConfig::default(),
            guard: GuardConfig::default(),
            social: SocialConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 10,
            allowed_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            progress_step: 5,
            step_interval_ms: 100,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec![
                "/upload".to_string(),
                "/results".to_string(),
                "/admin".to_string(),
            ],
            sign_in_path: "/signin".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Persisted session file, falling back to the platform data dir
    pub fn resolved_storage_path(&self) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(default_storage_path)
    }

    /// Upload limit in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.upload.max_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Resolve configuration following the documented priority order
pub fn resolve_config(cli_path: Option<&Path>) -> ClientConfig {
    let candidate = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .or_else(default_config_path);

    let mut config = match candidate {
        Some(path) if path.exists() => match ClientConfig::load_from_path(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(error = %e, "Config file unusable, using defaults");
                ClientConfig::default()
            }
        },
        Some(path) => {
            if cli_path.is_some() {
                warn!(path = %path.display(), "Config file not found, using defaults");
            }
            ClientConfig::default()
        }
        None => ClientConfig::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV_VAR) {
        if !url.trim().is_empty() {
            info!(api_base_url = %url, "API URL overridden from environment");
            config.api_base_url = url;
        }
    }

    config
}

/// Write configuration to TOML (temp file + rename)
pub fn write_toml_config(config: &ClientConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// `<config dir>/labtrack/config.toml`
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("labtrack").join("config.toml"))
}

/// `<local data dir>/labtrack/session.json`
fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("labtrack"))
        .unwrap_or_else(|| PathBuf::from("./labtrack_data"))
        .join("session.json")
}
