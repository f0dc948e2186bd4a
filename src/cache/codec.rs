//! Compression codecs applied to payloads at rest.
//!
//! The cache compresses on write and decompresses on read; callers above the
//! store only ever see plain bytes.

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use thiserror::Error;

/// Errors raised by a payload codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Compressing a payload failed.
    #[error("failed to compress payload: {0}")]
    Compress(#[source] std::io::Error),

    /// Stored bytes could not be decompressed.
    #[error("failed to decompress payload: {0}")]
    Decompress(#[source] std::io::Error),
}

/// Byte codec used by [`CacheStore`](super::CacheStore).
pub trait Codec: Send + Sync + fmt::Debug {
    /// Encodes `bytes` for storage.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Compress`] if encoding fails.
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decodes bytes previously produced by [`compress`](Self::compress).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decompress`] if `bytes` is not a valid encoding.
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// zlib codec (the default).
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: Compression,
}

impl ZlibCodec {
    /// Default compression level.
    pub const DEFAULT_LEVEL: u32 = 8;

    /// Creates a codec with an explicit level (0-9, clamped).
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEVEL)
    }
}

impl Codec for ZlibCodec {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 2), self.level);
        encoder.write_all(bytes).map_err(CodecError::Compress)?;
        encoder.finish().map_err(CodecError::Compress)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut out = Vec::with_capacity(bytes.len().saturating_mul(2));
        decoder
            .read_to_end(&mut out)
            .map_err(CodecError::Decompress)?;
        Ok(out)
    }
}

/// Stores payloads as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncompressed;

impl Codec for Uncompressed {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}
