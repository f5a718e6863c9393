//! File writer capability.
//!
//! ## `AtomicFileOperator::write`: protocol
//!
//! 1. Resolve the mode from `meta.permissions` (reject before touching disk).
//! 2. Ensure the parent directory exists.
//! 3. Write content to `<path>.keel.tmp` in the same directory.
//! 4. Apply the mode to the `.tmp` file.
//! 5. Rename to the final path (atomic on POSIX).
//!
//! Any failure from step 3 on removes the `.tmp` file and leaves the previous
//! file untouched.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use keel_core::FileMeta;

use crate::error::{io_err, SyncError};

/// Single-file filesystem mutations used by the apply engine.
///
/// Implemented by [`AtomicFileOperator`] in production; tests substitute
/// recording doubles.
pub trait FileOperator: Send + Sync {
    /// Write `content` to `meta.path` with `meta.permissions`.
    fn write(&self, content: &[u8], meta: &FileMeta) -> Result<(), SyncError>;

    /// Remove `path`. A file that is already absent is not an error.
    fn remove(&self, path: &Path) -> Result<(), SyncError>;
}

/// Production [`FileOperator`]: tmp-file + rename writes.
#[derive(Debug, Clone, Default)]
pub struct AtomicFileOperator;

impl AtomicFileOperator {
    pub fn new() -> Self {
        Self
    }
}

impl FileOperator for AtomicFileOperator {
    fn write(&self, content: &[u8], meta: &FileMeta) -> Result<(), SyncError> {
        let path = Path::new(&meta.path);
        let tmp = PathBuf::from(format!("{}.keel.tmp", path.display()));
        write_with_tmp(path, content, meta, &tmp)
    }

    fn remove(&self, path: &Path) -> Result<(), SyncError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("deleted: {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("already absent: {}", path.display());
                Ok(())
            }
            Err(err) => Err(io_err(path, err)),
        }
    }
}

fn write_with_tmp(
    path: &Path,
    content: &[u8],
    meta: &FileMeta,
    tmp: &Path,
) -> Result<(), SyncError> {
    // Step 1: resolve the mode.
    let mode = meta.mode().ok_or_else(|| SyncError::InvalidPermissions {
        path: meta.path.clone(),
        permissions: meta.permissions.clone(),
    })?;

    // Step 2: parent directories.
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    // Step 3: write the .tmp sibling.
    if let Err(e) = std::fs::write(tmp, content) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(tmp, e));
    }

    // Step 4: mode.
    if let Err(err) = set_mode(tmp, mode) {
        let _ = std::fs::remove_file(tmp);
        return Err(err);
    }

    // Step 5: atomic rename to final path.
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {} ({} bytes, mode {:o})", path.display(), content.len(), mode);
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), SyncError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
