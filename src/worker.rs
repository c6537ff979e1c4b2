//! Per-chunk transforms run by the worker pool.
//!
//! Both functions consume a [`Block`] and hand back a new one carrying the
//! same index.  They touch nothing but their arguments, which is what lets
//! any number of them run at once against a shared codec.

use log::debug;

use crate::codec::Codec;
use crate::error::{Error, Result};

/// A chunk payload in flight, raw or compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index:   usize,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(index: usize, payload: Vec<u8>) -> Self {
        Self { index, payload }
    }
}

/// Raw block in, compressed block out.
pub fn compress_block(codec: &dyn Codec, raw: Block) -> Result<Block> {
    let payload = codec
        .compress(&raw.payload)
        .map_err(|source| Error::BlockEncode { index: raw.index, source })?;
    debug!("chunk {}: {} -> {} bytes", raw.index, raw.payload.len(), payload.len());
    Ok(Block::new(raw.index, payload))
}

/// Compressed block in, raw block out.
pub fn decompress_block(codec: &dyn Codec, packed: Block) -> Result<Block> {
    let payload = codec
        .decompress(&packed.payload)
        .map_err(|source| Error::BlockDecode { index: packed.index, source })?;
    debug!("frame {}: {} -> {} bytes", packed.index, packed.payload.len(), payload.len());
    Ok(Block::new(packed.index, payload))
}
