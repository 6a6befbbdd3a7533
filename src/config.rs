//! Configuration management.
//!
//! Settings load from an optional TOML file with environment overrides on
//! top; every field has a working default so a bare `tender sync` runs
//! against the public portal without any setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::LlmConfig;
use crate::scrapers::{BrowserEngineConfig, RetryPolicy};

/// Public portal root.
pub const DEFAULT_PORTAL_BASE_URL: &str = "https://prod2.seace.gob.pe";
/// Search page for selection processes.
pub const DEFAULT_SEARCH_PATH: &str = "/seacebus-uiwd-pub/buscadorPublico/buscadorPublico.xhtml";

/// Portal access settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSettings {
    /// Portal base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the search page under the base URL.
    #[serde(default = "default_search_path")]
    pub search_path: String,
    /// Minimum delay between consecutive portal requests, in seconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: u64,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retry attempts per request, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Backoff before the second attempt, in seconds.
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: u64,
    /// Backoff ceiling, in seconds.
    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_PORTAL_BASE_URL.to_string()
}

fn default_search_path() -> String {
    DEFAULT_SEARCH_PATH.to_string()
}

fn default_request_delay() -> u64 {
    2
}

fn default_timeout() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base() -> u64 {
    4
}

fn default_retry_max() -> u64 {
    10
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            request_delay_secs: default_request_delay(),
            timeout_secs: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_base_secs: default_retry_base(),
            retry_max_secs: default_retry_max(),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub portal: PortalSettings,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Data directory override; defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Full URL of the search page.
    pub fn search_url(&self) -> String {
        format!(
            "{}{}",
            self.portal.base_url.trim_end_matches('/'),
            self.portal.search_path
        )
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tenderscout")
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("tenderscout.db")
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.portal.request_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.portal.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.portal.retry_attempts.max(1),
            base_backoff: Duration::from_secs(self.portal.retry_base_secs),
            max_backoff: Duration::from_secs(self.portal.retry_max_secs),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported: `TENDERSCOUT_PORTAL_URL`, `TENDERSCOUT_DATA_DIR`,
    /// `TENDERSCOUT_REQUEST_DELAY_SECS`.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("TENDERSCOUT_PORTAL_URL") {
            self.portal.base_url = val;
        }
        if let Ok(val) = std::env::var("TENDERSCOUT_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("TENDERSCOUT_REQUEST_DELAY_SECS") {
            if let Ok(secs) = val.parse() {
                self.portal.request_delay_secs = secs;
            }
        }
        self
    }
}

/// Load settings from an explicit path, or the default config location.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tenderscout")
            .join("config.toml")
    });

    let settings = if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)?;
        toml::from_str(&raw)?
    } else {
        Settings::default()
    };

    Ok(settings.with_env_overrides())
}
