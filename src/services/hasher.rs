//! Content identity: lowercase hex SHA-256 over the uncompressed bytes.

use sha2::{Digest, Sha256};

/// Length of an encoded content hash.
pub const CONTENT_HASH_LEN: usize = 64;

/// Incremental hasher fed chunk-by-chunk while the body streams in, so
/// capture never needs a second pass over the content.
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// One-shot digest of a complete buffer.
#[cfg(test)]
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(content);
    hasher.finalize_hex()
}
