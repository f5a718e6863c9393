//! Config apply engine.
//!
//! ## `FileManagerService::config_apply`: protocol
//!
//! 1. Drop the previous cycle's caches, so nothing from an earlier apply
//!    can be rolled back once this one has started.
//! 2. Every declared path must lie under an allow-listed directory. One
//!    outsider rejects the whole overview before anything is read or written.
//! 3. Diff the overview against disk (see [`crate::diff`]).
//! 4. Install `files_cache`, `file_contents_cache` and the recorded modes
//!    together from the diff output.
//! 5. Execute the cached actions, stopping at the first failure. Files
//!    already applied stay applied; [`FileManagerService::rollback`] can
//!    restore exactly those from the contents cache.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use keel_core::{AgentConfig, File, FileAction, FileMeta, FileOverview, InstanceId};

use crate::context::CallContext;
use crate::diff::{compare_file_hash, FileDiff};
use crate::error::{SyncError, TransferError};
use crate::hasher::{content_hash, read_and_hash};
use crate::overview::{describe, overview_from_paths};
use crate::transfer::TransferClient;
use crate::writer::FileOperator;

/// Applies declared file state for one managed instance.
///
/// One value per instance. Calls must not overlap; the daemon guarantees
/// this by giving each plugin a single message queue.
pub struct FileManagerService {
    transfer: TransferClient,
    operator: Arc<dyn FileOperator>,
    config: AgentConfig,
    /// Files that needed action in the last apply, keyed by path.
    files_cache: HashMap<String, File>,
    /// On-disk bytes read during the last diff, keyed by path.
    file_contents_cache: HashMap<String, Vec<u8>>,
    /// On-disk mode of each file in `file_contents_cache`.
    file_modes_cache: HashMap<String, String>,
    /// Paths the last apply actually mutated, in order.
    applied: Vec<String>,
}

impl FileManagerService {
    pub fn new(
        transfer: TransferClient,
        operator: Arc<dyn FileOperator>,
        config: AgentConfig,
    ) -> Self {
        Self {
            transfer,
            operator,
            config,
            files_cache: HashMap::new(),
            file_contents_cache: HashMap::new(),
            file_modes_cache: HashMap::new(),
            applied: Vec::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn files_cache(&self) -> &HashMap<String, File> {
        &self.files_cache
    }

    pub fn file_contents_cache(&self) -> &HashMap<String, Vec<u8>> {
        &self.file_contents_cache
    }

    /// Paths written or removed by the last apply, including a failed one.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// Bring disk in line with `overview`.
    pub async fn config_apply(
        &mut self,
        ctx: &CallContext,
        overview: &FileOverview,
    ) -> Result<(), SyncError> {
        self.files_cache.clear();
        self.file_contents_cache.clear();
        self.file_modes_cache.clear();
        self.applied.clear();

        self.check_allowed_directories(overview)?;

        let FileDiff {
            changed,
            contents,
            permissions,
        } = compare_file_hash(overview)?;
        tracing::info!(
            "config apply [{}]: {} of {} file(s) need action",
            ctx.correlation_id,
            changed.len(),
            overview.files.len()
        );
        self.files_cache = changed;
        self.file_contents_cache = contents;
        self.file_modes_cache = permissions;

        let mut applied = Vec::new();
        let result = self.file_actions(ctx, &mut applied).await;
        self.applied = applied;
        result
    }

    fn check_allowed_directories(&self, overview: &FileOverview) -> Result<(), SyncError> {
        match overview
            .files
            .iter()
            .find(|f| !self.config.is_directory_allowed(f.path()))
        {
            Some(file) => Err(SyncError::DisallowedPath {
                path: file.path().to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn file_actions(
        &self,
        ctx: &CallContext,
        applied: &mut Vec<String>,
    ) -> Result<(), SyncError> {
        let mut files: Vec<&File> = self.files_cache.values().collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));

        for file in files {
            let path = file.path().to_string();
            if ctx.is_cancelled() {
                return Err(SyncError::Cancelled { path });
            }
            if ctx.is_expired() {
                return Err(SyncError::Timeout { path });
            }

            match file.action {
                FileAction::Delete => {
                    self.operator.remove(Path::new(&path))?;
                    applied.push(path);
                }
                FileAction::Add | FileAction::Update => {
                    self.file_update(ctx, file, applied).await?
                }
                other => tracing::debug!("no action for {path} ({other})"),
            }
        }
        Ok(())
    }

    async fn file_update(
        &self,
        ctx: &CallContext,
        file: &File,
        applied: &mut Vec<String>,
    ) -> Result<(), SyncError> {
        let path = file.path();
        let content = self
            .transfer
            .fetch_file_content(ctx, &file.meta)
            .await
            .map_err(|source| remote_err("GetFile", path, source))?;

        self.operator.write(&content, &file.meta)?;
        // Written but unverified still counts: rollback must undo it.
        applied.push(path.to_string());

        let (_, actual) = read_and_hash(Path::new(path))?;
        if actual != file.meta.content_hash {
            return Err(SyncError::HashMismatch {
                path: path.to_string(),
                expected: file.meta.content_hash.clone(),
                actual,
            });
        }
        tracing::debug!("verified: {path}");
        Ok(())
    }

    /// Undo what the last apply changed.
    ///
    /// Only paths the apply actually wrote or removed are touched. Added
    /// files are removed; updated and deleted files get their previous bytes
    /// and mode back. Every such path is attempted; the first error is
    /// returned.
    pub fn rollback(&self) -> Result<(), SyncError> {
        let mut first_err = None;

        for path in self.applied.iter().rev() {
            let Some(file) = self.files_cache.get(path) else {
                continue;
            };
            let result = match (file.action, self.file_contents_cache.get(path)) {
                (FileAction::Add, _) => self.operator.remove(Path::new(path)),
                (FileAction::Update | FileAction::Delete, Some(previous)) => {
                    self.operator.write(previous, &self.previous_meta(file, previous))
                }
                (FileAction::Update | FileAction::Delete, None) => {
                    tracing::warn!("rollback: no cached content for {path}");
                    Ok(())
                }
                _ => Ok(()),
            };

            match result {
                Ok(()) => tracing::info!("rolled back: {path}"),
                Err(err) => {
                    tracing::error!("rollback failed for {path}: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    fn previous_meta(&self, file: &File, previous: &[u8]) -> FileMeta {
        let mut meta = file.meta.clone();
        meta.content_hash = content_hash(previous);
        if let Some(mode) = self.file_modes_cache.get(file.path()) {
            meta.permissions = mode.clone();
        }
        meta
    }

    /// Describe `paths` on disk and report them as the instance's overview.
    pub async fn update_overview<P: AsRef<Path>>(
        &self,
        ctx: &CallContext,
        instance_id: InstanceId,
        paths: &[P],
    ) -> Result<FileOverview, SyncError> {
        let overview = overview_from_paths(instance_id, paths)?;
        self.transfer.report_overview(ctx, &overview).await?;
        Ok(overview)
    }

    /// Report a single file's current content.
    pub async fn update_file(&self, ctx: &CallContext, path: &Path) -> Result<(), SyncError> {
        let (file, content) = describe(path)?;
        self.transfer
            .report_file_update(ctx, &file, &content)
            .await
            .map_err(|source| remote_err("UpdateFile", file.path(), source))
    }
}

fn remote_err(operation: &'static str, path: &str, source: TransferError) -> SyncError {
    let path = path.to_string();
    match source {
        TransferError::Timeout { .. } => SyncError::Timeout { path },
        TransferError::Cancelled { .. } => SyncError::Cancelled { path },
        source => SyncError::Remote {
            operation,
            path,
            source,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
