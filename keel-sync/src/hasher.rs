//! Content hashing.
//!
//! A content hash is the standard base64 encoding of the SHA-256 digest of a
//! file's raw bytes. It depends on nothing but the bytes, so two files with
//! identical content always hash identically regardless of path, mode or
//! mtime.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use keel_core::File;

use crate::error::{io_err, SyncError};

/// Hash raw bytes.
pub fn content_hash(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    STANDARD.encode(h.finalize())
}

/// Read a file and hash its content.
pub fn read_and_hash(path: &Path) -> Result<(Vec<u8>, String), SyncError> {
    let content = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let hash = content_hash(&content);
    Ok((content, hash))
}

/// Read a file, mapping "does not exist" to `None`.
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Version token for a set of files.
///
/// Content hashes are ordered by path and concatenated before hashing, so the
/// token does not depend on the order of `files`. A path declared twice
/// counts once (last declaration wins).
pub fn generate_config_version(files: &[File]) -> String {
    let by_path: BTreeMap<&str, &str> = files
        .iter()
        .map(|f| (f.meta.path.as_str(), f.meta.content_hash.as_str()))
        .collect();
    let joined: String = by_path.values().copied().collect();
    content_hash(joined.as_bytes())
}
