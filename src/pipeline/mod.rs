//! Pipeline orchestrator — the end-to-end compress and decompress runs.
//!
//! ```no_run
//! use gzblock::pipeline::{Pipeline, PipelineOptions};
//!
//! let pipeline = Pipeline::new(PipelineOptions::default())?;
//! let written  = pipeline.compress_file("data.bin", "data.gzb")?;
//! println!("Compressed {written} bytes");
//! pipeline.decompress_file("data.gzb", "data.out")?;
//! # Ok::<(), gzblock::Error>(())
//! ```
//!
//! # Run shape
//! 1. Options are validated before any I/O.
//! 2. Work is fanned out to a fixed-size rayon pool of `max_concurrency`
//!    threads.  Compression reads chunks sequentially through an iterator
//!    the pool pulls from, so at most one chunk per worker is in flight.
//!    Decompression parses every frame on the calling thread first, since
//!    each frame's offset depends on the one before it.
//! 3. Results land in [`ResultSlots`] keyed by chunk index.  The pool join
//!    is the barrier: nothing is written until every chunk has succeeded.
//! 4. A single thread writes the results in ascending index order.
//!
//! # Failure
//! The first failing chunk trips a [`FailureLatch`]: no further chunks are
//! read or started, running ones finish and are discarded, and that first
//! error is returned.  File-level runs write into a temporary file next to
//! the destination and only rename it into place on success.

mod slots;

pub use slots::{FailureLatch, ResultSlots};

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::codec::{Codec, GzipCodec, DEFAULT_LEVEL, MAX_LEVEL};
use crate::error::{Error, Result};
use crate::frame::{scan_frames, write_frame, FrameInfo, FrameReader, FRAME_PREFIX_SIZE, MAX_FRAME_PAYLOAD};
use crate::planner::{plan_chunks, ChunkDescriptor, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::worker::{compress_block, decompress_block, Block};

/// Ceiling for the default worker count.
pub const MAX_DEFAULT_CONCURRENCY: usize = 16;

/// Label used in errors when the pipeline runs over caller-supplied streams.
const STREAM_LABEL: &str = "<stream>";

/// Worker count used when none is configured: available parallelism,
/// capped at [`MAX_DEFAULT_CONCURRENCY`].
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .min(MAX_DEFAULT_CONCURRENCY)
}

// ── PipelineOptions ───────────────────────────────────────────────────────────

/// Configuration for a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Raw bytes per chunk.  Compression only; decompression follows the
    /// frames it finds.
    pub chunk_size:      usize,
    /// Worker threads, and so the bound on chunks in flight.
    pub max_concurrency: usize,
    /// Gzip level, 0–9.
    pub level:           u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size:      DEFAULT_CHUNK_SIZE,
            max_concurrency: default_concurrency(),
            level:           DEFAULT_LEVEL,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be greater than zero".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Configuration(format!(
                "chunk size {} exceeds the maximum of {MAX_CHUNK_SIZE} bytes", self.chunk_size
            )));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Configuration("max concurrency must be greater than zero".into()));
        }
        if self.level > MAX_LEVEL {
            return Err(Error::Configuration(format!(
                "compression level {} is outside 0..={MAX_LEVEL}", self.level
            )));
        }
        Ok(())
    }
}

// ── ArchiveSummary ────────────────────────────────────────────────────────────

/// Frame layout of an archive, as returned by [`inspect_file`].
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub archive_len: u64,
    pub frames:      Vec<FrameInfo>,
}

impl ArchiveSummary {
    /// Sum of payload lengths (prefixes excluded).
    pub fn payload_bytes(&self) -> u64 {
        self.frames.iter().map(|f| f.payload_len as u64).sum()
    }

    pub fn largest_frame(&self) -> Option<usize> {
        self.frames.iter().map(|f| f.payload_len).max()
    }
}

/// Walk an archive's frame prefixes without decompressing anything.
pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<ArchiveSummary> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| source_err(path, e))?;
    let frames = scan_frames(BufReader::new(file)).map_err(|e| reading(path, e))?;
    let archive_len = frames
        .last()
        .map(|f| f.offset + (FRAME_PREFIX_SIZE + f.payload_len) as u64)
        .unwrap_or(0);
    Ok(ArchiveSummary { archive_len, frames })
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    options: PipelineOptions,
    codec:   Box<dyn Codec>,
}

impl Pipeline {
    /// Gzip pipeline at `options.level`.
    pub fn new(options: PipelineOptions) -> Result<Self> {
        let codec = GzipCodec::new(options.level);
        Self::with_codec(options, Box::new(codec))
    }

    /// Pipeline over any block codec.  `options.level` is ignored.
    pub fn with_codec(options: PipelineOptions, codec: Box<dyn Codec>) -> Result<Self> {
        options.validate()?;
        Ok(Self { options, codec })
    }

    // ── File-level API ───────────────────────────────────────────────────────

    /// Compress `source` into a new archive at `destination`.
    ///
    /// Returns the compressed payload bytes written (length prefixes not
    /// counted).
    pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, destination: Q) -> Result<u64> {
        let (source, destination) = (source.as_ref(), destination.as_ref());
        let started = Instant::now();

        let file = File::open(source).map_err(|e| source_err(source, e))?;
        let total_len = file.metadata().map_err(|e| source_err(source, e))?.len();
        info!("compressing {} ({total_len} bytes)", source.display());

        let payloads = self.compress_chunks(BufReader::new(file), total_len, source)?;
        let written = commit(destination, |w| write_frames(w, &payloads))?;

        info!(
            "compressed {} -> {}: {total_len} -> {written} bytes in {} frames, {:.2?}",
            source.display(), destination.display(), payloads.len(), started.elapsed()
        );
        Ok(written)
    }

    /// Restore the original file from the archive at `source`.
    ///
    /// Returns the raw bytes written.
    pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, source: P, destination: Q) -> Result<u64> {
        let (source, destination) = (source.as_ref(), destination.as_ref());
        let started = Instant::now();

        let file = File::open(source).map_err(|e| source_err(source, e))?;
        info!("decompressing {}", source.display());

        let chunks = self.decompress_frames(BufReader::new(file), source)?;
        let written = commit(destination, |w| write_chunks(w, &chunks))?;

        info!(
            "decompressed {} -> {}: {} frames -> {written} bytes, {:.2?}",
            source.display(), destination.display(), chunks.len(), started.elapsed()
        );
        Ok(written)
    }

    // ── Stream-level API ─────────────────────────────────────────────────────

    /// Compress `total_len` bytes from `reader` into `writer`.
    ///
    /// `writer` is only touched once every chunk has compressed.
    pub fn compress_stream<R: Read + Send, W: Write>(&self, reader: R, total_len: u64, mut writer: W) -> Result<u64> {
        let payloads = self.compress_chunks(reader, total_len, Path::new(STREAM_LABEL))?;
        let written = write_frames(&mut writer, &payloads)?;
        writer.flush()?;
        Ok(written)
    }

    /// Decompress the archive read from `reader` into `writer`.
    pub fn decompress_stream<R: Read, W: Write>(&self, reader: R, mut writer: W) -> Result<u64> {
        let chunks = self.decompress_frames(reader, Path::new(STREAM_LABEL))?;
        let written = write_chunks(&mut writer, &chunks)?;
        writer.flush()?;
        Ok(written)
    }

    // ── In-memory API ────────────────────────────────────────────────────────

    pub fn compress_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.compress_stream(data, data.len() as u64, &mut out)?;
        Ok(out)
    }

    pub fn decompress_bytes(&self, archive: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decompress_stream(archive, &mut out)?;
        Ok(out)
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_concurrency)
            .thread_name(|i| format!("gzblock-worker-{i}"))
            .build()
            .map_err(|e| Error::Internal(format!("worker pool: {e}")))
    }

    /// Read, plan and compress every chunk.  Returns the compressed payloads
    /// in chunk order.
    fn compress_chunks<R: Read + Send>(&self, reader: R, total_len: u64, label: &Path) -> Result<Vec<Vec<u8>>> {
        let plan = plan_chunks(total_len, self.options.chunk_size)?;
        if plan.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "{} chunks of up to {} bytes on {} workers",
            plan.len(), self.options.chunk_size, self.options.max_concurrency
        );

        let slots = ResultSlots::new(plan.len());
        let latch = FailureLatch::new();
        let codec = self.codec.as_ref();

        self.thread_pool()?.install(|| {
            ChunkReader::new(reader, &plan, &latch, label)
                .par_bridge()
                .for_each(|chunk| {
                    if latch.is_tripped() {
                        return;
                    }
                    let outcome = chunk
                        .and_then(|raw| compress_block(codec, raw))
                        .and_then(|packed| slots.fill(packed));
                    if let Err(e) = outcome {
                        latch.trip(e);
                    }
                });
        });

        finish_run(latch)?;
        slots.into_ordered()
    }

    /// Parse every frame, then decompress them on the pool.  Returns the raw
    /// chunks in order.
    fn decompress_frames<R: Read>(&self, reader: R, label: &Path) -> Result<Vec<Vec<u8>>> {
        let blocks: Vec<Block> = FrameReader::new(reader)
            .collect::<Result<_>>()
            .map_err(|e| reading(label, e))?;
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        debug!("{} frames on {} workers", blocks.len(), self.options.max_concurrency);

        let slots = ResultSlots::new(blocks.len());
        let latch = FailureLatch::new();
        let codec = self.codec.as_ref();

        self.thread_pool()?.install(|| {
            blocks.into_par_iter().for_each(|packed| {
                if latch.is_tripped() {
                    return;
                }
                let outcome = decompress_block(codec, packed).and_then(|raw| slots.fill(raw));
                if let Err(e) = outcome {
                    latch.trip(e);
                }
            });
        });

        finish_run(latch)?;
        slots.into_ordered()
    }
}

// ── Chunk source ──────────────────────────────────────────────────────────────

/// Sequential reader over a chunk plan.  Each pull reads exactly the next
/// chunk's bytes; pulls stop as soon as the run has failed.
struct ChunkReader<'a, R> {
    reader: R,
    plan:   std::slice::Iter<'a, ChunkDescriptor>,
    latch:  &'a FailureLatch,
    label:  &'a Path,
}

impl<'a, R: Read> ChunkReader<'a, R> {
    fn new(reader: R, plan: &'a [ChunkDescriptor], latch: &'a FailureLatch, label: &'a Path) -> Self {
        Self { reader, plan: plan.iter(), latch, label }
    }
}

impl<R: Read> Iterator for ChunkReader<'_, R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.latch.is_tripped() {
            return None;
        }
        let chunk = self.plan.next()?;
        let mut buf = vec![0u8; chunk.length];
        Some(match self.reader.read_exact(&mut buf) {
            Ok(())  => Ok(Block::new(chunk.index, buf)),
            Err(e)  => Err(source_err(self.label, e)),
        })
    }
}

// ── Write phase ───────────────────────────────────────────────────────────────

fn write_frames<W: Write>(writer: &mut W, payloads: &[Vec<u8>]) -> Result<u64> {
    if let Some(p) = payloads.iter().find(|p| p.len() > MAX_FRAME_PAYLOAD) {
        return Err(Error::FrameTooLarge(p.len()));
    }
    let mut written = 0u64;
    for payload in payloads {
        written += write_frame(&mut *writer, payload)? as u64;
    }
    Ok(written)
}

fn write_chunks<W: Write>(writer: &mut W, chunks: &[Vec<u8>]) -> Result<u64> {
    let mut written = 0u64;
    for chunk in chunks {
        writer.write_all(chunk)?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

/// Write through `fill` into a temporary file beside `destination`, then
/// rename it over `destination`.  On any error the temporary is removed and
/// `destination` is left as it was.
fn commit<F>(destination: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<u64>,
{
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp = NamedTempFile::new_in(&dir).map_err(|e| dest_err(destination, e))?;

    let written = {
        let mut w = BufWriter::new(tmp.as_file());
        let written = fill(&mut w).map_err(|e| writing(destination, e))?;
        w.flush().map_err(|e| dest_err(destination, e))?;
        written
    };
    tmp.as_file().sync_all().map_err(|e| dest_err(destination, e))?;
    tmp.persist(destination).map_err(|e| dest_err(destination, e.error))?;
    Ok(written)
}

fn finish_run(latch: FailureLatch) -> Result<()> {
    latch.into_result().map_err(|e| {
        warn!("run aborted: {e}");
        e
    })
}

// ── Error attribution ─────────────────────────────────────────────────────────

fn source_err(path: &Path, source: io::Error) -> Error {
    Error::SourceUnavailable { path: path.to_path_buf(), source }
}

fn dest_err(path: &Path, source: io::Error) -> Error {
    Error::DestinationWrite { path: path.to_path_buf(), source }
}

/// Raw I/O failures while reading belong to the source.
fn reading(path: &Path, err: Error) -> Error {
    match err {
        Error::Io(e) => source_err(path, e),
        other        => other,
    }
}

/// Raw I/O failures while writing belong to the destination.
fn writing(path: &Path, err: Error) -> Error {
    match err {
        Error::Io(e) => dest_err(path, e),
        other        => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, StoreCodec};
    use crate::frame::encode_frame;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options(chunk_size: usize, max_concurrency: usize) -> PipelineOptions {
        PipelineOptions { chunk_size, max_concurrency, ..PipelineOptions::default() }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Fails on one chunk and counts how many chunks it was asked to do.
    struct FailOn {
        bad:   Vec<u8>,
        calls: AtomicUsize,
    }

    impl Codec for FailOn {
        fn name(&self) -> &'static str { "fail-on" }
        fn compress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if data == self.bad.as_slice() {
                return Err(CodecError::Compression("rejected".into()));
            }
            Ok(data.to_vec())
        }
        fn decompress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
            Ok(data.to_vec())
        }
    }

    #[test]
    fn validate_rejects_bad_options() {
        assert!(matches!(options(0, 4).validate(), Err(Error::Configuration(_))));
        assert!(matches!(options(1024, 0).validate(), Err(Error::Configuration(_))));
        assert!(matches!(options(MAX_CHUNK_SIZE + 1, 4).validate(), Err(Error::Configuration(_))));
        let bad_level = PipelineOptions { level: 10, ..PipelineOptions::default() };
        assert!(matches!(bad_level.validate(), Err(Error::Configuration(_))));
        assert!(PipelineOptions::default().validate().is_ok());
    }

    #[test]
    fn default_concurrency_is_bounded() {
        let n = default_concurrency();
        assert!(n >= 1 && n <= MAX_DEFAULT_CONCURRENCY);
    }

    #[test]
    fn ten_bytes_make_one_frame() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 0];
        let pipeline = Pipeline::new(options(10, 4)).unwrap();
        let archive = pipeline.compress_bytes(&data).unwrap();
        let frames = scan_frames(archive.as_slice()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload_len + FRAME_PREFIX_SIZE, archive.len());
        assert_eq!(pipeline.decompress_bytes(&archive).unwrap(), data);
    }

    #[test]
    fn empty_input_makes_empty_archive() {
        let pipeline = Pipeline::new(options(16, 2)).unwrap();
        let archive = pipeline.compress_bytes(&[]).unwrap();
        assert!(archive.is_empty());
        assert!(pipeline.decompress_bytes(&archive).unwrap().is_empty());
    }

    #[test]
    fn store_codec_frames_are_the_raw_chunks() {
        let pipeline = Pipeline::with_codec(options(4, 3), Box::new(StoreCodec)).unwrap();
        let archive = pipeline.compress_bytes(b"abcdefghij").unwrap();
        let mut expected = Vec::new();
        for part in [&b"abcd"[..], b"efgh", b"ij"] {
            expected.extend(encode_frame(part).unwrap());
        }
        assert_eq!(archive, expected);
    }

    #[test]
    fn compress_stream_counts_payload_bytes_only() {
        let pipeline = Pipeline::with_codec(options(4, 2), Box::new(StoreCodec)).unwrap();
        let mut out = Vec::new();
        let written = pipeline.compress_stream(&b"abcdefghij"[..], 10, &mut out).unwrap();
        assert_eq!(written, 10);
        assert_eq!(out.len(), 10 + 3 * FRAME_PREFIX_SIZE);
    }

    #[test]
    fn first_chunk_failure_aborts_without_output() {
        let data = sample(64 * 10);
        let codec = FailOn { bad: data[..64].to_vec(), calls: AtomicUsize::new(0) };
        let pipeline = Pipeline::with_codec(options(64, 1), Box::new(codec)).unwrap();
        let mut out = Vec::new();
        let err = pipeline.compress_stream(data.as_slice(), data.len() as u64, &mut out).unwrap_err();
        assert!(matches!(err, Error::BlockEncode { index: 0, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn failure_stops_further_chunks() {
        let data = sample(64 * 50);
        let codec = std::sync::Arc::new(FailOn { bad: data[..64].to_vec(), calls: AtomicUsize::new(0) });

        struct Shared(std::sync::Arc<FailOn>);
        impl Codec for Shared {
            fn name(&self) -> &'static str { self.0.name() }
            fn compress(&self, d: &[u8]) -> std::result::Result<Vec<u8>, CodecError> { self.0.compress(d) }
            fn decompress(&self, d: &[u8]) -> std::result::Result<Vec<u8>, CodecError> { self.0.decompress(d) }
        }

        let pipeline = Pipeline::with_codec(options(64, 1), Box::new(Shared(codec.clone()))).unwrap();
        assert!(pipeline.compress_bytes(&data).is_err());
        // One worker, failing on chunk 0: nothing after it is started.
        assert_eq!(codec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_source_is_source_unavailable() {
        let pipeline = Pipeline::new(options(8, 2)).unwrap();
        let err = pipeline.compress_stream(&b"only nine"[..], 100, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[test]
    fn truncated_archive_is_corrupted() {
        let pipeline = Pipeline::new(options(100, 4)).unwrap();
        let mut archive = pipeline.compress_bytes(&sample(1000)).unwrap();
        archive.pop();
        let err = pipeline.decompress_bytes(&archive).unwrap_err();
        assert!(matches!(err, Error::CorruptedArchive { frame: 9, .. }));
    }

    #[test]
    fn extra_member_inside_a_frame_is_block_decode_error() {
        let codec = GzipCodec::default();
        let mut payload = codec.compress(b"first").unwrap();
        payload.extend(codec.compress(b"second").unwrap());
        let archive = encode_frame(&payload).unwrap();

        let pipeline = Pipeline::new(options(100, 2)).unwrap();
        let err = pipeline.decompress_bytes(&archive).unwrap_err();
        assert!(matches!(err, Error::BlockDecode { index: 0, .. }), "got {err:?}");

        let mut junk = codec.compress(b"hello").unwrap();
        junk.extend_from_slice(b"JUNKJUNK");
        let err = pipeline.decompress_bytes(&encode_frame(&junk).unwrap()).unwrap_err();
        assert!(matches!(err, Error::BlockDecode { index: 0, .. }), "got {err:?}");
    }

    #[test]
    fn garbage_payload_is_block_decode_error() {
        let pipeline = Pipeline::new(options(100, 4)).unwrap();
        let mut archive = pipeline.compress_bytes(&sample(300)).unwrap();
        archive.extend(encode_frame(b"not a gzip member").unwrap());
        let mut out = Vec::new();
        let err = pipeline.decompress_stream(archive.as_slice(), &mut out).unwrap_err();
        assert!(matches!(err, Error::BlockDecode { index: 3, .. }));
        assert!(out.is_empty());
    }
}
