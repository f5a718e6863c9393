//! keel core library: domain types, agent configuration, errors.
//!
//! Public API surface:
//! - [`types`]: declared file state and apply request/outcome types
//! - [`config`]: [`AgentConfig`] load / save / allow-list checks
//! - [`error`]: [`ConfigError`]
//! - [`paths`]: well-known locations under `~/.keel/`

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{AgentConfig, CommandSettings, CommonSettings, ConfigApplySettings};
pub use error::ConfigError;
pub use types::{
    ConfigApplyOutcome, ConfigApplyRequest, ConfigVersion, File, FileAction, FileMeta,
    FileOverview, InstanceId,
};
