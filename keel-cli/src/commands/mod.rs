pub mod apply;
pub mod daemon;
pub mod diff;
pub mod hash;
pub mod overview;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use keel_core::{config, AgentConfig, ConfigApplyRequest, ConfigError};

/// Load `--config` if given, else `~/.keel/agent.yaml`, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AgentConfig> {
    if let Some(path) = explicit {
        return config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let home = dirs::home_dir().context("could not determine home directory")?;
    match config::load_at(&home) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound { path }) => {
            eprintln!("no config at {}, using defaults", path.display());
            Ok(AgentConfig::default())
        }
        Err(err) => Err(err).context("failed to load agent config"),
    }
}

pub fn read_request(path: &Path) -> Result<ConfigApplyRequest> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read request {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid config apply request {}", path.display()))
}

/// Current-thread runtime for one-shot commands.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
