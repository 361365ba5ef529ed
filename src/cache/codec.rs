//! Compression Codec
//!
//! Serializes values to JSON bytes and lz4-compresses payloads above a size
//! threshold. Compression is an optimization only: any failure falls back to
//! storing the serialized bytes as-is.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::CodecError;

/// lz4 block format cannot expand beyond this ratio, so a larger size prefix
/// means the payload is corrupt.
const MAX_LZ4_RATIO: usize = 255;

/// Length of the little-endian size prefix written by `lz4::block::compress`.
const SIZE_PREFIX_LEN: usize = 4;

// == Encoded Payload ==
/// Serialized value ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub bytes: Bytes,
    pub compressed: bool,
    /// Serialized length before compression
    pub raw_len: usize,
}

// == Compression Codec ==
/// Threshold-based lz4 codec.
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    threshold: usize,
    enabled: bool,
}

impl CompressionCodec {
    /// Creates a codec compressing payloads strictly larger than `threshold`.
    ///
    /// With `enabled == false` the codec never compresses but can still read
    /// compressed payloads, for example ones restored from disk.
    pub fn new(threshold: usize, enabled: bool) -> Self {
        Self { threshold, enabled }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    // == Should Compress ==
    pub fn should_compress(&self, serialized_len: usize) -> bool {
        self.enabled && serialized_len > self.threshold
    }

    // == Compress ==
    /// Compresses raw bytes. When compression is disabled this is a no-op.
    pub fn compress(&self, data: &[u8]) -> Result<Bytes, CodecError> {
        if !self.enabled {
            return Ok(Bytes::copy_from_slice(data));
        }

        lz4::block::compress(data, Some(lz4::block::CompressionMode::DEFAULT), true)
            .map(Bytes::from)
            .map_err(|e| CodecError::CompressionFailed(e.to_string()))
    }

    // == Decompress ==
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        if data.len() < SIZE_PREFIX_LEN {
            return Err(CodecError::DecompressionFailed(
                "payload shorter than size prefix".to_string(),
            ));
        }

        let mut prefix = [0u8; SIZE_PREFIX_LEN];
        prefix.copy_from_slice(&data[..SIZE_PREFIX_LEN]);
        let claimed = i32::from_le_bytes(prefix);
        let limit = data.len().saturating_mul(MAX_LZ4_RATIO) + 16;
        if claimed < 0 || claimed as usize > limit {
            return Err(CodecError::DecompressionFailed(format!(
                "implausible decompressed size {}",
                claimed
            )));
        }

        lz4::block::decompress(data, None)
            .map_err(|e| CodecError::DecompressionFailed(e.to_string()))
    }

    // == Encode ==
    /// Serializes `value` and compresses it when worthwhile.
    ///
    /// `force` overrides the threshold: `Some(false)` never compresses,
    /// `Some(true)` always attempts, `None` compresses above the threshold.
    /// The compressed form is kept only if it is strictly smaller.
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        force: Option<bool>,
    ) -> Result<EncodedPayload, CodecError> {
        let raw = serde_json::to_vec(value)?;
        let raw_len = raw.len();

        let attempt = match force {
            Some(false) => false,
            Some(true) => self.enabled,
            None => self.should_compress(raw_len),
        };

        if attempt {
            match self.compress(&raw) {
                Ok(compressed) if compressed.len() < raw_len => {
                    debug!(raw_len, compressed_len = compressed.len(), "payload compressed");
                    return Ok(EncodedPayload {
                        bytes: compressed,
                        compressed: true,
                        raw_len,
                    });
                }
                Ok(_) => debug!(raw_len, "compression did not shrink payload, storing plain"),
                Err(e) => warn!("{}, storing plain", e),
            }
        }

        Ok(EncodedPayload {
            bytes: Bytes::from(raw),
            compressed: false,
            raw_len,
        })
    }

    // == Decode ==
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8], compressed: bool) -> Result<T, CodecError> {
        if compressed {
            let raw = self.decompress(payload)?;
            Ok(serde_json::from_slice(&raw)?)
        } else {
            Ok(serde_json::from_slice(payload)?)
        }
    }
}
