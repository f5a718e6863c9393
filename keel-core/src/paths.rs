//! Well-known locations under `<home>/.keel/`.
//!
//! ```text
//! ~/.keel/
//!   agent.yaml        (agent configuration)
//!   inbox/            (config apply requests dropped here are picked up by the daemon)
//!   logs/
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "agent.yaml";
pub const INBOX_DIR: &str = "inbox";

pub fn keel_root(home: &Path) -> PathBuf {
    home.join(".keel")
}

pub fn config_path(home: &Path) -> PathBuf {
    keel_root(home).join(CONFIG_FILE)
}

pub fn inbox_dir(home: &Path) -> PathBuf {
    keel_root(home).join(INBOX_DIR)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    keel_root(home).join("logs")
}

/// `dirs::home_dir()` or [`ConfigError::HomeNotFound`].
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
