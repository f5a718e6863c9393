//! Build a [`FileOverview`] from what is currently on disk.

use std::path::Path;

use chrono::{DateTime, Utc};

use keel_core::{ConfigVersion, File, FileAction, FileMeta, FileOverview, InstanceId};

use crate::error::{io_err, SyncError};
use crate::hasher::{generate_config_version, read_and_hash};

/// Describe one on-disk file. The action is always `UNCHANGED`.
pub fn file_from_path(path: &Path) -> Result<File, SyncError> {
    describe(path).map(|(file, _)| file)
}

/// Like [`file_from_path`], also returning the bytes that were hashed.
pub(crate) fn describe(path: &Path) -> Result<(File, Vec<u8>), SyncError> {
    let (content, hash) = read_and_hash(path)?;
    let metadata = std::fs::metadata(path).map_err(|e| io_err(path, e))?;

    let meta = FileMeta {
        path: path.to_string_lossy().into_owned(),
        content_hash: hash,
        permissions: mode_string(&metadata),
        size: content.len() as u64,
        modified_time: metadata.modified().ok().map(DateTime::<Utc>::from),
    };
    Ok((File::new(meta, FileAction::Unchanged), content))
}

/// Overview of `paths` for `instance_id`, versioned by content.
///
/// Every path must exist; the first unreadable one aborts.
pub fn overview_from_paths<P: AsRef<Path>>(
    instance_id: InstanceId,
    paths: &[P],
) -> Result<FileOverview, SyncError> {
    let files = paths
        .iter()
        .map(|p| file_from_path(p.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let version = generate_config_version(&files);

    Ok(FileOverview {
        files,
        config_version: ConfigVersion {
            instance_id,
            version,
        },
    })
}

#[cfg(unix)]
pub(crate) fn mode_string(metadata: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:04o}", metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub(crate) fn mode_string(_metadata: &std::fs::Metadata) -> String {
    keel_core::types::DEFAULT_PERMISSIONS.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::content_hash;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    #[test]
    fn describes_file_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.conf");
        std::fs::write(&path, "events {}\n").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        let file = file_from_path(&path).unwrap();
        assert_eq!(file.action, FileAction::Unchanged);
        assert_eq!(file.meta.content_hash, content_hash(b"events {}\n"));
        assert_eq!(file.meta.size, 10);
        assert_eq!(
            file.meta.modified_time.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[cfg(unix)]
    #[test]
    fn captures_mode_string() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secret.conf");
        std::fs::write(&path, "k").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let file = file_from_path(&path).unwrap();
        assert_eq!(file.meta.permissions, "0600");
        assert_eq!(file.meta.mode(), Some(0o600));
    }

    #[test]
    fn overview_version_matches_generated() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.conf");
        let b = tmp.path().join("b.conf");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let overview = overview_from_paths(InstanceId::from("nginx-1"), &[&a, &b]).unwrap();
        assert_eq!(overview.files.len(), 2);
        assert_eq!(overview.config_version.instance_id.0, "nginx-1");
        assert_eq!(
            overview.config_version.version,
            generate_config_version(&overview.files)
        );

        let reversed = overview_from_paths(InstanceId::from("nginx-1"), &[&b, &a]).unwrap();
        assert_eq!(
            reversed.config_version.version,
            overview.config_version.version
        );
    }

    #[test]
    fn missing_path_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = overview_from_paths(InstanceId::from("x"), &[tmp.path().join("gone")])
            .unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }
}
