//! Browser engine configuration types.

use serde::{Deserialize, Serialize};

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false for debugging against the live portal.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Ceiling for the post-search result wait, in seconds. Hitting it is a
    /// degraded-success path, not a failure.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Pause after tab activation and after the result wait, in seconds,
    /// letting the page's partial renders finish.
    #[serde(default = "default_settle")]
    pub settle: u64,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            timeout: default_timeout(),
            settle: default_settle(),
            chrome_args: Vec::new(),
        }
    }
}

pub fn default_headless() -> bool {
    true
}

pub fn default_timeout() -> u64 {
    30
}

pub fn default_settle() -> u64 {
    3
}
