//! Configuration and credential file locations

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::expiry::DEFAULT_RENEWAL_WINDOW_SECS;
use crate::auth::RenewalSettings;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform API root, e.g. `https://learn.example.com/api`
    pub api_base_url: String,
    /// Renew the access credential this many seconds before it expires
    pub renewal_window_secs: u64,
    /// Suppress automatic renewal for this long after a failed one
    pub renewal_cooldown_secs: u64,
    /// HTTP request timeout; unset leaves the transport default
    pub request_timeout_secs: Option<u64>,
    /// Override for where credential files live
    pub state_dir: Option<PathBuf>,
    /// Keep the access credential in `session.toml`. When false it lives in
    /// memory only and every run starts by renewing.
    pub persist_access: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            renewal_window_secs: DEFAULT_RENEWAL_WINDOW_SECS,
            renewal_cooldown_secs: 0,
            request_timeout_secs: None,
            state_dir: None,
            persist_access: true,
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "lms-session", "lms-session")
            .context("Could not determine config directory")
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Point at a different API root (CLI override).
    pub fn with_api_base_url(mut self, url: String) -> Result<Self> {
        self.api_base_url = url;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url '{}'", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("api_base_url must be http(s), got '{}'", url.scheme());
        }
        Ok(())
    }

    /// Persistent file holding the refresh credential.
    pub fn credentials_path(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.join("credentials.toml")),
            None => Ok(Self::project_dirs()?.config_dir().join("credentials.toml")),
        }
    }

    /// Session-scoped file holding the access credential.
    pub fn session_path(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.join("session.toml")),
            None => Ok(Self::project_dirs()?.cache_dir().join("session.toml")),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn renewal_settings(&self) -> RenewalSettings {
        RenewalSettings {
            window_secs: self.renewal_window_secs,
            cooldown: Duration::from_secs(self.renewal_cooldown_secs),
        }
    }
}
