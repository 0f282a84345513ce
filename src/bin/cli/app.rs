use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use atelier_lib::remote::{HttpRemoteStore, RemoteStore};
use atelier_lib::sync::{EngineOptions, SyncConfig, SyncEngine};

/// Command-line values that take precedence over the config file
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub server: Option<String>,
    pub workspace: Option<String>,
    pub token: Option<String>,
}

/// Shared application state for CLI commands
pub struct App {
    pub engine: SyncEngine,
}

impl App {
    /// Load config (file, then environment, then flags) and open the workspace
    pub async fn open(overrides: Overrides) -> Result<Self> {
        let config_path = match overrides.config {
            Some(p) => p,
            None => SyncConfig::default_path().context("Failed to locate config directory")?,
        };
        let mut config = SyncConfig::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        config.apply_env();

        if let Some(server) = overrides.server {
            config.server_url = server;
        }
        if overrides.workspace.is_some() {
            config.workspace = overrides.workspace;
        }
        if overrides.token.is_some() {
            config.token = overrides.token;
        }

        let workspace = config
            .workspace
            .clone()
            .context("No workspace given. Pass --workspace or set ATELIER_WORKSPACE")?;

        let store: Arc<dyn RemoteStore> = Arc::new(
            HttpRemoteStore::new(&config.server_url, config.request_timeout(), config.connect_timeout())
                .context("Failed to create HTTP client")?,
        );

        let engine = SyncEngine::open(
            store,
            &workspace,
            config.token.as_deref(),
            EngineOptions::from_config(&config),
        )
        .await
        .with_context(|| format!("Failed to open workspace '{}'", workspace))?;

        Ok(Self { engine })
    }

    pub fn close(self) {
        self.engine.close();
    }
}
