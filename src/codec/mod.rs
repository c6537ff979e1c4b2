//! Single-block compression primitives.
//!
//! # Contract
//! A [`Codec`] turns one raw chunk into one self-contained compressed block
//! and back.  Calls are independent: no state survives between them, so one
//! codec instance is shared by every worker in the pool.
//!
//! The archive does not record which codec produced it.  A reader must be
//! configured with the same codec the writer used; the default everywhere is
//! [`GzipCodec`].
//!
//! # Gzip blocks
//! Every block written by [`GzipCodec`] is a complete RFC 1952 member, so
//! the payloads of an archive concatenated without their length prefixes
//! form a valid multi-member `.gz` stream.

use std::io::{self, Read, Write};
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

/// Default gzip level (zlib's own default).
pub const DEFAULT_LEVEL: u32 = 6;
/// Highest level accepted by [`GzipCodec`].
pub const MAX_LEVEL:     u32 = 9;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

/// No compression — payload stored verbatim.
pub struct StoreCodec;
impl Codec for StoreCodec {
    fn name(&self) -> &'static str { "store" }
    fn compress(&self, data: &[u8])   -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

/// DEFLATE wrapped in a gzip member.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    /// `level` is clamped to `0..=9`.
    pub fn new(level: u32) -> Self {
        Self { level: level.min(MAX_LEVEL) }
    }
}

impl Default for GzipCodec {
    fn default() -> Self { Self::new(DEFAULT_LEVEL) }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str { "gzip" }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut enc = GzEncoder::new(
            Vec::with_capacity(data.len() / 2 + 64),
            Compression::new(self.level),
        );
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        // finish() drains the deflate state and appends the CRC32/ISIZE trailer.
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(data.len().saturating_mul(2));
        let mut dec = GzDecoder::new(data);
        dec.read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        // One block is exactly one member; anything after it is corruption.
        let rest = dec.into_inner();
        if !rest.is_empty() {
            return Err(CodecError::Decompression(format!(
                "{} trailing bytes after gzip member", rest.len()
            )));
        }
        Ok(out)
    }
}
