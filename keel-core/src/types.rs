//! Domain types for declared configuration state.
//!
//! File paths are carried as `String` on the wire types because they are
//! compared, hashed and used as cache keys verbatim; callers convert to
//! `Path` at the filesystem boundary.
//! All types are serializable/deserializable via serde.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a managed instance (one process whose config we own).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Desired action for a declared file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    #[default]
    Unspecified,
    Unchanged,
    Add,
    Update,
    Delete,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Unspecified => write!(f, "unspecified"),
            FileAction::Unchanged => write!(f, "unchanged"),
            FileAction::Add => write!(f, "add"),
            FileAction::Update => write!(f, "update"),
            FileAction::Delete => write!(f, "delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Identity and expected state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Absolute, OS-native path.
    pub path: String,
    /// Opaque content digest (see `keel_sync::hasher`).
    #[serde(default)]
    pub content_hash: String,
    /// POSIX mode string, e.g. `"0644"`.
    #[serde(default = "default_permissions")]
    pub permissions: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
}

fn default_permissions() -> String {
    DEFAULT_PERMISSIONS.to_string()
}

/// Mode applied when a declared file carries no permissions.
pub const DEFAULT_PERMISSIONS: &str = "0644";

impl FileMeta {
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            permissions: default_permissions(),
            size: 0,
            modified_time: None,
        }
    }

    /// Parse `permissions` as an octal mode. Empty strings fall back to
    /// [`DEFAULT_PERMISSIONS`]; anything unparsable yields `None`.
    pub fn mode(&self) -> Option<u32> {
        let raw = self.permissions.trim();
        let raw = if raw.is_empty() { DEFAULT_PERMISSIONS } else { raw };
        let digits = raw.strip_prefix("0o").unwrap_or(raw);
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
    }
}

/// A [`FileMeta`] plus the action declared for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub meta: FileMeta,
    #[serde(default)]
    pub action: FileAction,
}

impl File {
    pub fn new(meta: FileMeta, action: FileAction) -> Self {
        Self { meta, action }
    }

    pub fn path(&self) -> &str {
        &self.meta.path
    }
}

/// Version token of an overview, bound to the instance it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfigVersion {
    pub instance_id: InstanceId,
    pub version: String,
}

/// One complete declared target state for one managed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileOverview {
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub config_version: ConfigVersion,
}

/// Inbound request from the control plane asking for an overview to be
/// applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigApplyRequest {
    /// Correlates the request with logs and follow-up reports.
    #[serde(default)]
    pub correlation_id: String,
    /// `None` models a malformed request with no overview attached.
    pub overview: Option<FileOverview>,
}

/// Outcome of one apply, published back to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigApplyOutcome {
    pub correlation_id: String,
    pub instance_id: InstanceId,
    pub version: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
