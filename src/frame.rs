//! Length-prefixed block framing — the whole on-disk format.
//!
//! # Layout
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ payload length (u32) │ payload (length bytes)   │  frame 0
//! ├──────────────────────┼──────────────────────────┤
//! │ payload length (u32) │ payload                  │  frame 1
//! └──────────────────────┴──────────────────────────┘  ...
//! ```
//! The prefix is 4 bytes, big-endian.  Frames are concatenated in chunk
//! order with no padding, header, footer or count; the chunk index is the
//! frame's position.  An empty file is a valid archive with zero frames.
//!
//! # End of stream
//! Hitting EOF with zero prefix bytes read is the normal end of the archive.
//! Any other short read, inside the prefix or inside the payload, is
//! corruption.

use std::io::{self, Read, Write};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};
use crate::worker::Block;

/// Width of the length prefix in bytes.
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Largest payload a frame can describe.
pub const MAX_FRAME_PAYLOAD: usize = u32::MAX as usize;

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Prefix + payload as one buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(FRAME_PREFIX_SIZE + payload.len());
    write_frame(&mut out, payload)?;
    Ok(out)
}

/// Write one frame.  Returns the number of payload bytes written.
pub fn write_frame<W: Write>(mut writer: W, payload: &[u8]) -> Result<usize> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    writer.write_u32::<BigEndian>(payload.len() as u32)?;
    writer.write_all(payload)?;
    Ok(payload.len())
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Read as many bytes as are available up to `buf.len()`, retrying on
/// `Interrupted`.  Returns the count actually read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0)  => break,
            Ok(n)  => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read the length prefix of frame number `frame`.
///
/// `Ok(None)` means a clean end of archive.
pub fn read_frame_header<R: Read>(reader: &mut R, frame: usize) -> Result<Option<usize>> {
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    match read_full(reader, &mut prefix)? {
        0 => Ok(None),
        FRAME_PREFIX_SIZE => Ok(Some(BigEndian::read_u32(&prefix) as usize)),
        n => Err(Error::CorruptedArchive {
            frame,
            reason: format!("length prefix truncated after {n} of {FRAME_PREFIX_SIZE} bytes"),
        }),
    }
}

/// Read exactly `expected` payload bytes of frame number `frame`.
pub fn read_frame_payload<R: Read>(reader: &mut R, frame: usize, expected: usize) -> Result<Vec<u8>> {
    // Grow with the data instead of trusting the prefix for the allocation;
    // a corrupt prefix may claim up to 4 GiB.
    let mut payload = Vec::new();
    let got = reader.by_ref().take(expected as u64).read_to_end(&mut payload)?;
    check_payload_len(frame, expected, got as u64)?;
    Ok(payload)
}

/// Truncation check shared by payload reads and skips.
fn check_payload_len(frame: usize, expected: usize, got: u64) -> Result<()> {
    if got == expected as u64 {
        return Ok(());
    }
    Err(Error::CorruptedArchive {
        frame,
        reason: format!("payload truncated: declared {expected} bytes, found {got}"),
    })
}

// ── Iteration ────────────────────────────────────────────────────────────────

/// Sequential frame parser.  Yields one [`Block`] per frame, indexed by
/// position; stops for good after the first error.
pub struct FrameReader<R: Read> {
    reader: R,
    next:   usize,
    done:   bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, next: 0, done: false }
    }

    fn read_next(&mut self) -> Result<Option<Block>> {
        let index = self.next;
        let Some(len) = read_frame_header(&mut self.reader, index)? else {
            return Ok(None);
        };
        let payload = read_frame_payload(&mut self.reader, index, len)?;
        self.next += 1;
        Ok(Some(Block { index, payload }))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ── Scan ─────────────────────────────────────────────────────────────────────

/// Location of one frame, as found by [`scan_frames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub index:       usize,
    /// Byte offset of the length prefix within the archive.
    pub offset:      u64,
    pub payload_len: usize,
}

/// Walk the prefixes of an archive without keeping any payload.
pub fn scan_frames<R: Read>(mut reader: R) -> Result<Vec<FrameInfo>> {
    let mut frames = Vec::new();
    let mut offset = 0u64;
    while let Some(len) = read_frame_header(&mut reader, frames.len())? {
        let skipped = io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())?;
        check_payload_len(frames.len(), len, skipped)?;
        frames.push(FrameInfo { index: frames.len(), offset, payload_len: len });
        offset += (FRAME_PREFIX_SIZE + len) as u64;
    }
    Ok(frames)
}
