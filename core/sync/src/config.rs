//! Client configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use url::Url;

use fragments_common::{Error, Result};

use crate::scheduler::SyncMode;

/// Environment variable overriding the API URL.
pub const API_URL_ENV: &str = "API_URL";

/// Default API URL, a locally running fragments server.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Configuration of a fragments client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the fragments API.
    pub api_url: String,
    /// Registered name of the local store backend.
    pub store_backend: String,
    /// Backend-specific store configuration, e.g. `{"path": "..."}`.
    pub store_config: Value,
    /// When resyncs run without being asked for.
    pub sync_mode: SyncMode,
    /// Seconds between connectivity probes in watch mode.
    pub probe_interval: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            store_backend: "sqlite".to_string(),
            store_config: Value::Null,
            sync_mode: SyncMode::default(),
            probe_interval: 30,
        }
    }
}

impl ClientConfig {
    /// Read a JSON configuration file. Missing keys take their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON
    /// - Invalid API URL
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `API_URL` from the environment, if set.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => self.with_api_url(url),
            _ => self,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Check that the API URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid api_url '{}': {}", self.api_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "api_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.store_backend.is_empty() {
            return Err(Error::InvalidInput("store_backend cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval.max(1))
    }
}
