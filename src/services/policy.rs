//! Admission rules gating what fetched content may be stored.

use crate::services::error::{SnapshotError, SnapshotResult};
use regex::Regex;

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Size ceiling plus a MIME allow-list pattern.
#[derive(Clone, Debug)]
pub struct AdmissionPolicy {
    max_size_bytes: u64,
    allowed_mime: Regex,
}

impl AdmissionPolicy {
    /// Build a policy. The pattern is anchored at the start of the bare MIME
    /// type only, so `text/` admits every text type.
    pub fn new(max_size_bytes: u64, allowed_mime_regex: &str) -> Result<Self, regex::Error> {
        let allowed_mime = Regex::new(&format!("^(?:{})", allowed_mime_regex))?;
        Ok(Self {
            max_size_bytes,
            allowed_mime,
        })
    }

    /// Inclusive upper bound on content length.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn check_size(&self, size: u64) -> SnapshotResult<()> {
        if size > self.max_size_bytes {
            return Err(SnapshotError::ContentTooLarge {
                limit: self.max_size_bytes,
            });
        }
        Ok(())
    }

    pub fn check_mime(&self, mime: &str) -> SnapshotResult<()> {
        if self.allowed_mime.is_match(mime) {
            Ok(())
        } else {
            Err(SnapshotError::MimeNotAllowed(mime.to_string()))
        }
    }

    pub fn admit(&self, mime: &str, size: u64) -> SnapshotResult<()> {
        self.check_mime(mime)?;
        self.check_size(size)
    }
}
