use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::Compression;
use crate::workspace::NamingPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Could not write config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config directory not found")]
    ConfigDirNotFound,
}

/// Connection and behaviour settings for a workspace session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Backend base URL (e.g., "https://ide.example.com/api")
    pub server_url: String,
    /// Workspace to open when none is given explicitly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Access token sent with the workspace metadata request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Directories whose created names are made route-safe
    pub reserved_namespaces: Vec<String>,
    /// Compression for archives produced locally
    pub compression: Compression,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            workspace: None,
            token: None,
            reserved_namespaces: vec!["routes".to_string()],
            compression: Compression::Deflated,
            request_timeout_secs: 300,
            connect_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// `<config dir>/atelier/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("atelier").join("config.toml"))
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Load config from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `ATELIER_SERVER_URL`, `ATELIER_WORKSPACE` and `ATELIER_TOKEN` overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ATELIER_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(workspace) = lookup("ATELIER_WORKSPACE") {
            self.workspace = Some(workspace);
        }
        if let Some(token) = lookup("ATELIER_TOKEN") {
            self.token = Some(token);
        }
    }

    pub fn naming_policy(&self) -> NamingPolicy {
        NamingPolicy::with_route_namespaces(self.reserved_namespaces.iter().cloned())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
