//! Production [`FileServiceClient`] over a tonic channel.

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

use crate::error::TransferError;
use crate::proto::{
    self, GetFileRequest, GetFileResponse, UpdateFileRequest, UpdateFileResponse,
    UpdateOverviewRequest, UpdateOverviewResponse,
};
use crate::transfer::FileServiceClient;

/// Unary gRPC client for `keel.v1.FileService`.
#[derive(Clone)]
pub struct GrpcFileServiceClient {
    inner: Grpc<Channel>,
}

impl GrpcFileServiceClient {
    /// Build a client that connects on first use.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_lazy(server_url: &str) -> Result<Self, TransferError> {
        let endpoint = Endpoint::from_shared(server_url.to_string())
            .map_err(|e| TransferError::Transport(format!("invalid server url {server_url}: {e}")))?;
        Ok(Self {
            inner: Grpc::new(endpoint.connect_lazy()),
        })
    }

    async fn unary<Req, Resp>(&self, request: Req, path: &'static str) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("file service not ready: {e}")))?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl FileServiceClient for GrpcFileServiceClient {
    async fn get_file(&self, request: GetFileRequest) -> Result<GetFileResponse, Status> {
        self.unary(request, proto::GET_FILE_PATH).await
    }

    async fn update_file(&self, request: UpdateFileRequest) -> Result<UpdateFileResponse, Status> {
        self.unary(request, proto::UPDATE_FILE_PATH).await
    }

    async fn update_overview(
        &self,
        request: UpdateOverviewRequest,
    ) -> Result<UpdateOverviewResponse, Status> {
        self.unary(request, proto::UPDATE_OVERVIEW_PATH).await
    }
}
