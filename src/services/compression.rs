//! Payload codecs keyed by [`Compression`].
//!
//! Every codec sits behind the [`Codec`] trait and is looked up through
//! [`Compression::codec`], so adding a format means one new variant, one new
//! impl and one new match arm. Content hashing and admission checks happen
//! before encoding and never see these bytes.

use crate::{
    models::snapshot::Compression,
    services::error::{SnapshotError, SnapshotResult},
};
use flate2::{Compression as GzLevel, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use tracing::instrument;

const GZIP_LEVEL: GzLevel = GzLevel::new(6);
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 3;

/// A reversible byte transform.
pub trait Codec: Send + Sync {
    fn encode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>>;
    fn decode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>>;
}

struct Identity;

impl Codec for Identity {
    fn encode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        Ok(input.to_vec())
    }
}

struct Gzip;

impl Codec for Gzip {
    fn encode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(input.len() / 2), GZIP_LEVEL);
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        let mut output = Vec::new();
        GzDecoder::new(input)
            .read_to_end(&mut output)
            .map_err(|err| SnapshotError::Decode {
                codec: "gzip",
                reason: err.to_string(),
            })?;
        Ok(output)
    }
}

#[cfg(feature = "zstd")]
struct Zstd;

#[cfg(feature = "zstd")]
impl Codec for Zstd {
    fn encode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        Ok(zstd::stream::encode_all(input, ZSTD_LEVEL)?)
    }

    fn decode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        zstd::stream::decode_all(input).map_err(|err| SnapshotError::Decode {
            codec: "zstd",
            reason: err.to_string(),
        })
    }
}

impl Compression {
    /// Resolve the codec for this variant.
    ///
    /// Fails with `CompressionUnavailable` instead of falling back when the
    /// codec was compiled out.
    pub fn codec(&self) -> SnapshotResult<&'static dyn Codec> {
        match self {
            Compression::None => Ok(&Identity),
            Compression::Gzip => Ok(&Gzip),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Ok(&Zstd),
            #[cfg(not(feature = "zstd"))]
            Compression::Zstd => Err(SnapshotError::CompressionUnavailable("zstd")),
        }
    }

    #[instrument(skip(input), fields(codec = %self, input_size = input.len(), output_size))]
    pub fn encode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        let output = self.codec()?.encode(input)?;
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }

    #[instrument(skip(input), fields(codec = %self, input_size = input.len(), output_size))]
    pub fn decode(&self, input: &[u8]) -> SnapshotResult<Vec<u8>> {
        let output = self.codec()?.decode(input)?;
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }
}
