//! Represents a captured copy of a link's content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Codec applied to a snapshot payload at rest.
///
/// Stored as lowercase text (`none`, `gzip`, `zstd`) in both SQLite and JSON.
/// `Zstd` always parses, but encoding or decoding with it fails when the
/// crate is built without the `zstd` feature.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Compression {
    /// Payload stored as fetched.
    None,
    /// RFC 1952 gzip member.
    #[default]
    Gzip,
    /// Zstandard frame.
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one immutable snapshot.
///
/// The payload itself lives on disk beneath the store's base path; this
/// struct only describes it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Snapshot {
    /// Assigned at creation.
    pub id: Uuid,

    /// Owning link, managed by the surrounding application.
    pub link_id: i64,

    /// Principal that requested the capture, when one was supplied.
    pub created_by: Option<i64>,

    /// URL the content was fetched from.
    pub source_url: String,

    /// Bare MIME type (no parameters), lower-cased.
    pub mime_type: String,

    /// Length of the fetched content before compression.
    pub size_original: i64,

    /// Length of the payload as stored.
    pub size_compressed: i64,

    pub compression: Compression,

    /// Lowercase hex SHA-256 of the uncompressed content.
    pub content_hash: String,

    /// Upstream `ETag`, verbatim.
    pub etag: Option<String>,

    /// Upstream `Last-Modified`, when it parsed as an HTTP date.
    pub last_modified: Option<DateTime<Utc>>,

    /// Set when the capture bypassed deduplication.
    pub forced: bool,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_defaults_to_gzip() {
        assert_eq!(Compression::default(), Compression::Gzip);
    }

    #[test]
    fn compression_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Compression::Zstd).unwrap(), "\"zstd\"");
        let parsed: Compression = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, Compression::None);
        assert!(serde_json::from_str::<Compression>("\"brotli\"").is_err());
    }
}
