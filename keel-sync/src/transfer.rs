//! Remote transfer client.
//!
//! [`FileServiceClient`] is the raw RPC boundary (one method per gRPC call).
//! [`TransferClient`] wraps it with request metadata, status classification
//! and bounded retry, and is what the apply engine talks to.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tonic::{Code, Status};
use uuid::Uuid;

use keel_core::{File, FileMeta, FileOverview};

use crate::backoff::{retry, BackoffPolicy, Disposition};
use crate::context::CallContext;
use crate::error::TransferError;
use crate::proto::{
    self, GetFileRequest, GetFileResponse, UpdateFileRequest, UpdateFileResponse,
    UpdateOverviewRequest, UpdateOverviewResponse,
};

/// The control plane's file service.
#[async_trait]
pub trait FileServiceClient: Send + Sync {
    async fn get_file(&self, request: GetFileRequest) -> Result<GetFileResponse, Status>;

    async fn update_file(&self, request: UpdateFileRequest) -> Result<UpdateFileResponse, Status>;

    async fn update_overview(
        &self,
        request: UpdateOverviewRequest,
    ) -> Result<UpdateOverviewResponse, Status>;
}

/// Map a status to retry behaviour.
///
/// Codes describing a request the server will never accept are terminal;
/// everything else (unavailable, deadline exceeded, internal, unknown, ...)
/// is treated as a transient transport problem.
pub fn classify_status(status: &Status) -> Disposition {
    match status.code() {
        Code::InvalidArgument
        | Code::Unimplemented
        | Code::NotFound
        | Code::AlreadyExists
        | Code::PermissionDenied
        | Code::Unauthenticated
        | Code::FailedPrecondition
        | Code::OutOfRange => Disposition::Terminal,
        _ => Disposition::Retryable,
    }
}

/// Retrying front-end to a [`FileServiceClient`].
#[derive(Clone)]
pub struct TransferClient {
    client: Option<Arc<dyn FileServiceClient>>,
    policy: BackoffPolicy,
}

impl TransferClient {
    pub fn new(client: Arc<dyn FileServiceClient>, policy: BackoffPolicy) -> Self {
        Self {
            client: Some(client),
            policy,
        }
    }

    /// A client with no transport; every call fails with
    /// [`TransferError::NotInitialized`].
    pub fn uninitialized(policy: BackoffPolicy) -> Self {
        Self {
            client: None,
            policy,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn client(&self) -> Result<&Arc<dyn FileServiceClient>, TransferError> {
        self.client.as_ref().ok_or(TransferError::NotInitialized)
    }

    /// Fetch the content declared by `meta`.
    pub async fn fetch_file_content(
        &self,
        ctx: &CallContext,
        meta: &FileMeta,
    ) -> Result<Vec<u8>, TransferError> {
        let client = self.client()?;
        let request = GetFileRequest {
            message_meta: Some(message_meta(ctx)),
            file_meta: Some(proto::FileMeta::from(meta)),
        };

        tracing::debug!("fetching file content for {}", meta.path);
        let response = retry("GetFile", &self.policy, ctx, classify_status, || {
            let request = request.clone();
            async move { client.get_file(request).await }
        })
        .await?;

        Ok(response.contents.map(|c| c.contents).unwrap_or_default())
    }

    /// Report the full current state of an instance.
    pub async fn report_overview(
        &self,
        ctx: &CallContext,
        overview: &FileOverview,
    ) -> Result<(), TransferError> {
        let client = self.client()?;
        let request = UpdateOverviewRequest {
            message_meta: Some(message_meta(ctx)),
            overview: Some(proto::FileOverview::from(overview)),
        };

        tracing::info!(
            "reporting overview for instance {} ({} files)",
            overview.config_version.instance_id,
            overview.files.len()
        );
        retry("UpdateOverview", &self.policy, ctx, classify_status, || {
            let request = request.clone();
            async move { client.update_overview(request).await }
        })
        .await?;
        Ok(())
    }

    /// Report one file's metadata and content.
    pub async fn report_file_update(
        &self,
        ctx: &CallContext,
        file: &File,
        content: &[u8],
    ) -> Result<(), TransferError> {
        let client = self.client()?;
        let request = UpdateFileRequest {
            message_meta: Some(message_meta(ctx)),
            file: Some(proto::File::from(file)),
            contents: Some(proto::FileContents {
                contents: content.to_vec(),
            }),
        };

        tracing::info!("reporting file update for {}", file.meta.path);
        retry("UpdateFile", &self.policy, ctx, classify_status, || {
            let request = request.clone();
            async move { client.update_file(request).await }
        })
        .await?;
        Ok(())
    }
}

fn message_meta(ctx: &CallContext) -> proto::MessageMeta {
    proto::MessageMeta {
        message_id: Uuid::new_v4().to_string(),
        correlation_id: ctx.correlation_id.clone(),
        timestamp: Some(SystemTime::now().into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
