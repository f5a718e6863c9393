//! # keel-sync
//!
//! Config apply engine: diff declared file state against disk, check it
//! against the allow-list, fetch and write what changed, and verify the
//! result by re-hashing.
//!
//! [`FileManagerService`] is the entry point. Remote calls go through a
//! [`TransferClient`], which retries a [`FileServiceClient`] under a
//! [`BackoffPolicy`]; file mutations go through a [`FileOperator`].

pub mod backoff;
pub mod context;
pub mod diff;
pub mod error;
pub mod grpc;
pub mod hasher;
pub mod manager;
pub mod overview;
pub mod proto;
pub mod transfer;
pub mod writer;

pub use backoff::{BackoffPolicy, Disposition};
pub use context::CallContext;
pub use diff::{compare_file_hash, FileDiff};
pub use error::{SyncError, TransferError};
pub use grpc::GrpcFileServiceClient;
pub use hasher::{content_hash, generate_config_version};
pub use manager::FileManagerService;
pub use overview::{file_from_path, overview_from_paths};
pub use transfer::{classify_status, FileServiceClient, TransferClient};
pub use writer::{AtomicFileOperator, FileOperator};
