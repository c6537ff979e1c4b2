//! Block-parallel gzip compression.
//!
//! A source file is cut into fixed-size chunks, each chunk is gzipped on a
//! bounded worker pool, and the results are written back in chunk order as
//! length-prefixed frames.  See [`frame`] for the on-disk layout and
//! [`pipeline`] for how a run is coordinated.

pub mod codec;
pub mod error;
pub mod frame;
pub mod planner;
pub mod pipeline;
pub mod worker;

pub use codec::{Codec, CodecError, GzipCodec, StoreCodec};
pub use error::{Error, Result};
pub use frame::{encode_frame, read_frame_header, read_frame_payload, FrameReader, FRAME_PREFIX_SIZE};
pub use planner::{plan_chunks, ChunkDescriptor, DEFAULT_CHUNK_SIZE};
pub use pipeline::{inspect_file, Pipeline, PipelineOptions};
pub use worker::{compress_block, decompress_block, Block};
