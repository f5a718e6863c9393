//! Declared-state vs on-disk diff.
//!
//! A declared file needs action iff:
//! - it is declared `DELETE` and present on disk, or
//! - it is not declared `DELETE` and is absent, or its on-disk content hash
//!   differs from the declared hash.
//!
//! Included files carry their resolved action: `DELETE` stays `DELETE`,
//! everything else becomes `ADD` (absent) or `UPDATE` (present).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use keel_core::{File, FileAction, FileOverview};

use crate::error::{io_err, SyncError};
use crate::hasher::{content_hash, read_if_exists};
use crate::overview::mode_string;

/// Output of [`compare_file_hash`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Files requiring action, keyed by path.
    pub changed: HashMap<String, File>,
    /// Bytes read from disk during the pass, keyed by path.
    pub contents: HashMap<String, Vec<u8>>,
    /// On-disk mode of every file in `contents`, as a mode string.
    pub permissions: HashMap<String, String>,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Compare `overview` against the filesystem.
///
/// Any read error other than not-found aborts the whole diff.
pub fn compare_file_hash(overview: &FileOverview) -> Result<FileDiff, SyncError> {
    let mut diff = FileDiff::default();
    let mut seen = HashSet::new();

    for file in &overview.files {
        let name = file.path();
        if name.is_empty() {
            return Err(SyncError::InvalidOverview(
                "declared file has an empty path".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(SyncError::InvalidOverview(format!(
                "path declared more than once: {name}"
            )));
        }

        let current = read_if_exists(Path::new(name))?;
        let resolved = resolve_action(file, current.as_deref());

        if let Some(bytes) = current {
            let metadata = std::fs::metadata(name).map_err(|e| io_err(name, e))?;
            diff.permissions.insert(name.to_string(), mode_string(&metadata));
            diff.contents.insert(name.to_string(), bytes);
        }

        match resolved {
            Some(action) => {
                tracing::debug!("changed ({action}): {name}");
                diff.changed.insert(
                    name.to_string(),
                    File {
                        meta: file.meta.clone(),
                        action,
                    },
                );
            }
            None => tracing::debug!("unchanged: {name}"),
        }
    }

    Ok(diff)
}

fn resolve_action(file: &File, current: Option<&[u8]>) -> Option<FileAction> {
    match (file.action, current) {
        (FileAction::Delete, None) => None,
        (FileAction::Delete, Some(_)) => Some(FileAction::Delete),
        (_, None) => Some(FileAction::Add),
        (_, Some(bytes)) => {
            if content_hash(bytes) == file.meta.content_hash {
                None
            } else {
                Some(FileAction::Update)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
