// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for FrameShift

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::options::AnalysisConfig;
use crate::{FrameShiftError, Result};

/// Environment variable overriding `service.endpoint`
pub const ENDPOINT_ENV: &str = "FRAMESHIFT_API_URL";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Analysis service location
    #[serde(default)]
    pub service: ServiceConfig,

    /// Options used when none are given on the command line
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Upload preview settings
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Origin that relative endpoints are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Absolute URL or path relative to `base_url`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Largest accepted upload, per request
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

// Default value functions
fn default_base_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_endpoint() -> String { "/api/analyze".to_string() }
fn default_max_dimension() -> u32 { 256 }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }
fn default_max_upload() -> usize { 32 * 1024 * 1024 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoint: default_endpoint(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl ServiceConfig {
    /// Resolve the endpoint to an absolute http(s) URL. Absolute endpoints
    /// are used as-is; anything else is joined onto `base_url`.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = match Url::parse(&self.endpoint) {
            Ok(url) => url,
            Err(_) => {
                let base = Url::parse(&self.base_url).map_err(|e| {
                    FrameShiftError::Config(format!("Invalid base_url '{}': {}", self.base_url, e))
                })?;
                base.join(&self.endpoint).map_err(|e| {
                    FrameShiftError::Config(format!("Invalid endpoint '{}': {}", self.endpoint, e))
                })?
            }
        };

        // "localhost:9000/api" parses with "localhost" as the scheme
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FrameShiftError::Config(format!(
                "Endpoint '{}' must use http or https, not '{}'",
                url, other
            ))),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| FrameShiftError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load, then apply the endpoint override from the environment
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_endpoint_override(std::env::var(ENDPOINT_ENV).ok());
        Ok(config)
    }

    pub fn apply_endpoint_override(&mut self, endpoint: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            tracing::debug!("Endpoint overridden: {}", endpoint);
            self.service.endpoint = endpoint;
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check everything that can be checked without the network
    pub fn validate(&self) -> Result<()> {
        self.service.endpoint_url()?;
        if self.preview.max_dimension == 0 {
            return Err(FrameShiftError::Config("preview.max_dimension must be positive".into()));
        }
        if self.web.max_upload_bytes == 0 {
            return Err(FrameShiftError::Config("web.max_upload_bytes must be positive".into()));
        }
        Ok(())
    }
}
