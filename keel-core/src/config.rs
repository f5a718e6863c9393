//! Agent configuration.
//!
//! Loaded from YAML at `<home>/.keel/agent.yaml` (or an explicit path).
//! Like the rest of the crate, every loader has an `_at` form taking an
//! explicit home directory; tests must only use the `_at` forms.
//!
//! ```yaml
//! instance_id: nginx-1
//! allowed_directories:
//!   - /etc/nginx
//! common:
//!   initial_interval: 500ms
//!   max_interval: 5s
//!   max_elapsed_time: 30s
//! command:
//!   server_url: http://127.0.0.1:8981
//! config_apply:
//!   timeout: 60s
//!   rollback_on_failure: false
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::paths;
use crate::types::InstanceId;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Backoff settings shared by every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSettings {
    #[serde(default = "default_initial_interval", with = "humantime_serde")]
    pub initial_interval: Duration,

    #[serde(default = "default_max_interval", with = "humantime_serde")]
    pub max_interval: Duration,

    /// Upper bound on the time one remote call may spend retrying.
    #[serde(default = "default_max_elapsed_time", with = "humantime_serde")]
    pub max_elapsed_time: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
}

const fn default_initial_interval() -> Duration {
    Duration::from_millis(500)
}

const fn default_max_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_max_elapsed_time() -> Duration {
    Duration::from_secs(30)
}

const fn default_multiplier() -> f64 {
    1.5
}

const fn default_randomization_factor() -> f64 {
    0.5
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self {
            initial_interval: default_initial_interval(),
            max_interval: default_max_interval(),
            max_elapsed_time: default_max_elapsed_time(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
        }
    }
}

/// Connection to the control plane's file service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSettings {
    pub server_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigApplySettings {
    /// Deadline for one whole apply, including every remote call it makes.
    #[serde(default = "default_apply_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Restore the previous file contents when an apply fails part-way.
    #[serde(default)]
    pub rollback_on_failure: bool,
}

const fn default_apply_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ConfigApplySettings {
    fn default() -> Self {
        Self {
            timeout: default_apply_timeout(),
            rollback_on_failure: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// Root of `agent.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub instance_id: InstanceId,

    /// Directories the agent may write to or delete from.
    #[serde(default)]
    pub allowed_directories: Vec<PathBuf>,

    #[serde(default)]
    pub common: CommonSettings,

    /// `None` leaves the file service client uninitialised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSettings>,

    #[serde(default)]
    pub config_apply: ConfigApplySettings,
}

impl AgentConfig {
    /// Whether `path` lies inside one of the allow-listed directories.
    ///
    /// Matching is component-wise on the lexically normalised path, so
    /// `/etc/app2/x` is not inside `/etc/app` and `/etc/app/../other/x` is
    /// not inside it either. Relative paths are never allowed.
    pub fn is_directory_allowed(&self, path: impl AsRef<Path>) -> bool {
        let Some(candidate) = normalize_absolute(path.as_ref()) else {
            return false;
        };
        self.allowed_directories.iter().any(|dir| {
            normalize_absolute(dir)
                .map(|dir| candidate.starts_with(&dir))
                .unwrap_or(false)
        })
    }

    /// Check values serde cannot express constraints for.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for dir in &self.allowed_directories {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "allowed directory must be absolute: {}",
                    dir.display()
                )));
            }
        }
        if self.common.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "common.multiplier must be >= 1.0, got {}",
                self.common.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.common.randomization_factor) {
            return Err(ConfigError::Invalid(format!(
                "common.randomization_factor must be within [0, 1], got {}",
                self.common.randomization_factor
            )));
        }
        if self.common.initial_interval > self.common.max_interval {
            return Err(ConfigError::Invalid(
                "common.initial_interval must not exceed common.max_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
///
/// Returns `None` for relative paths and for paths that climb above the root.
fn normalize_absolute(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load and validate the config at an explicit file path.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<AgentConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: AgentConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.keel/agent.yaml`.
pub fn load_at(home: &Path) -> Result<AgentConfig, ConfigError> {
    load_from(&paths::config_path(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<AgentConfig, ConfigError> {
    load_at(&paths::home()?)
}

/// Atomically save `config` to `<home>/.keel/agent.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `rename`.
pub fn save_at(home: &Path, config: &AgentConfig) -> Result<(), ConfigError> {
    let path = paths::config_path(home);
    let root = paths::keel_root(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config_with(dirs: &[&str]) -> AgentConfig {
        AgentConfig {
            allowed_directories: dirs.iter().map(PathBuf::from).collect(),
            ..AgentConfig::default()
        }
    }

    #[rstest]
    #[case("/etc/app/a.conf", true)]
    #[case("/etc/app/conf.d/nested/b.conf", true)]
    #[case("/etc/app", true)]
    #[case("/etc/app2/a.conf", false)]
    #[case("/etc/other/c.conf", false)]
    #[case("/etc/app/../other/c.conf", false)]
    #[case("/etc/app/./a.conf", true)]
    #[case("etc/app/a.conf", false)]
    #[case("/../../etc/app/a.conf", false)]
    fn directory_allow_list(#[case] path: &str, #[case] allowed: bool) {
        let config = config_with(&["/etc/app"]);
        assert_eq!(config.is_directory_allowed(path), allowed, "path: {path}");
    }

    #[test]
    fn empty_allow_list_allows_nothing() {
        let config = config_with(&[]);
        assert!(!config.is_directory_allowed("/etc/app/a.conf"));
    }

    #[test]
    fn validate_rejects_relative_allowed_directory() {
        let config = config_with(&["etc/app"]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn validate_rejects_bad_backoff_values() {
        let mut config = config_with(&["/etc/app"]);
        config.common.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = config_with(&["/etc/app"]);
        config.common.randomization_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = config_with(&["/etc/app"]);
        config.common.initial_interval = Duration::from_secs(10);
        config.common.max_interval = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AgentConfig::default();
        assert_eq!(config.common.initial_interval, Duration::from_millis(500));
        assert_eq!(config.common.max_interval, Duration::from_secs(5));
        assert_eq!(config.common.max_elapsed_time, Duration::from_secs(30));
        assert_eq!(config.config_apply.timeout, Duration::from_secs(60));
        assert!(!config.config_apply.rollback_on_failure);
        assert!(config.command.is_none());
    }
}
