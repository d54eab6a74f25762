//! Error taxonomy shared by every snapshot component.

use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to fetch `{url}`: {reason}")]
    Fetch { url: String, reason: String },
    #[error("timed out after {seconds}s fetching `{url}`")]
    FetchTimeout { url: String, seconds: u64 },
    #[error("content too large: more than {limit} bytes")]
    ContentTooLarge { limit: u64 },
    #[error("MIME type `{0}` is not allowed")]
    MimeNotAllowed(String),
    #[error("payload is not valid {codec} data: {reason}")]
    Decode { codec: &'static str, reason: String },
    #[error("compression `{0}` is not available in this build")]
    #[cfg_attr(feature = "zstd", allow(dead_code))]
    CompressionUnavailable(&'static str),
    #[error("snapshot `{0}` not found")]
    NotFound(Uuid),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
