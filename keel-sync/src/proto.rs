//! Wire messages for the `keel.v1.FileService` gRPC service.
//!
//! ```text
//! service FileService {
//!   rpc GetFile(GetFileRequest) returns (GetFileResponse);
//!   rpc UpdateFile(UpdateFileRequest) returns (UpdateFileResponse);
//!   rpc UpdateOverview(UpdateOverviewRequest) returns (UpdateOverviewResponse);
//! }
//! ```

use chrono::{DateTime, Utc};

pub const GET_FILE_PATH: &str = "/keel.v1.FileService/GetFile";
pub const UPDATE_FILE_PATH: &str = "/keel.v1.FileService/UpdateFile";
pub const UPDATE_OVERVIEW_PATH: &str = "/keel.v1.FileService/UpdateOverview";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageMeta {
    #[prost(string, tag = "1")]
    pub message_id: String,
    #[prost(string, tag = "2")]
    pub correlation_id: String,
    #[prost(message, optional, tag = "3")]
    pub timestamp: Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileMeta {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub hash: String,
    #[prost(message, optional, tag = "3")]
    pub modified_time: Option<::prost_types::Timestamp>,
    #[prost(string, tag = "4")]
    pub permissions: String,
    #[prost(int64, tag = "5")]
    pub size: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FileAction {
    Unspecified = 0,
    Unchanged = 1,
    Add = 2,
    Update = 3,
    Delete = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct File {
    #[prost(message, optional, tag = "1")]
    pub file_meta: Option<FileMeta>,
    #[prost(enumeration = "FileAction", tag = "2")]
    pub action: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileContents {
    #[prost(bytes = "vec", tag = "1")]
    pub contents: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigVersion {
    #[prost(string, tag = "1")]
    pub instance_id: String,
    #[prost(string, tag = "2")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileOverview {
    #[prost(message, repeated, tag = "1")]
    pub files: Vec<File>,
    #[prost(message, optional, tag = "2")]
    pub config_version: Option<ConfigVersion>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFileRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub file_meta: Option<FileMeta>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFileResponse {
    #[prost(message, optional, tag = "1")]
    pub contents: Option<FileContents>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateFileRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub file: Option<File>,
    #[prost(message, optional, tag = "3")]
    pub contents: Option<FileContents>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateFileResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateOverviewRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub overview: Option<FileOverview>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateOverviewResponse {}

// ---------------------------------------------------------------------------
// Domain -> wire
// ---------------------------------------------------------------------------

pub(crate) fn timestamp(at: DateTime<Utc>) -> ::prost_types::Timestamp {
    ::prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

impl From<&keel_core::FileMeta> for FileMeta {
    fn from(meta: &keel_core::FileMeta) -> Self {
        Self {
            name: meta.path.clone(),
            hash: meta.content_hash.clone(),
            modified_time: meta.modified_time.map(timestamp),
            permissions: meta.permissions.clone(),
            size: i64::try_from(meta.size).unwrap_or(i64::MAX),
        }
    }
}

impl From<keel_core::FileAction> for FileAction {
    fn from(action: keel_core::FileAction) -> Self {
        match action {
            keel_core::FileAction::Unspecified => FileAction::Unspecified,
            keel_core::FileAction::Unchanged => FileAction::Unchanged,
            keel_core::FileAction::Add => FileAction::Add,
            keel_core::FileAction::Update => FileAction::Update,
            keel_core::FileAction::Delete => FileAction::Delete,
        }
    }
}

impl From<&keel_core::File> for File {
    fn from(file: &keel_core::File) -> Self {
        Self {
            file_meta: Some(FileMeta::from(&file.meta)),
            action: FileAction::from(file.action) as i32,
        }
    }
}

impl From<&keel_core::FileOverview> for FileOverview {
    fn from(overview: &keel_core::FileOverview) -> Self {
        Self {
            files: overview.files.iter().map(File::from).collect(),
            config_version: Some(ConfigVersion {
                instance_id: overview.config_version.instance_id.0.clone(),
                version: overview.config_version.version.clone(),
            }),
        }
    }
}
