//! Chunk planning: split a source of known length into contiguous,
//! exhaustive byte ranges.
//!
//! Every chunk but the last is exactly `chunk_size` bytes; the last holds
//! the remainder and is never empty.  A zero-length source has no chunks.

use crate::error::{Error, Result};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
/// Upper bound on the chunk size, chosen so a compressed chunk always fits
/// a 32-bit frame length prefix.
pub const MAX_CHUNK_SIZE:     usize = 1024 * 1024 * 1024;

/// One planned chunk of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index:  usize,
    /// Byte offset in the source.
    pub offset: u64,
    pub length: usize,
}

/// Number of chunks `plan_chunks` will produce.
pub fn chunk_count(total_len: u64, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    total_len.div_ceil(chunk_size as u64) as usize
}

/// Plan the chunks of a `total_len`-byte source.
pub fn plan_chunks(total_len: u64, chunk_size: usize) -> Result<Vec<ChunkDescriptor>> {
    if chunk_size == 0 {
        return Err(Error::Configuration("chunk size must be greater than zero".into()));
    }
    let step  = chunk_size as u64;
    let count = chunk_count(total_len, chunk_size);
    let plan  = (0..count)
        .map(|index| {
            let offset = index as u64 * step;
            ChunkDescriptor {
                index,
                offset,
                length: step.min(total_len - offset) as usize,
            }
        })
        .collect();
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_source_has_no_chunks() {
        assert!(plan_chunks(0, 16).unwrap().is_empty());
    }

    #[test]
    fn small_source_is_one_chunk() {
        let plan = plan_chunks(10, 1024).unwrap();
        assert_eq!(plan, vec![ChunkDescriptor { index: 0, offset: 0, length: 10 }]);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let plan = plan_chunks(30, 10).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|c| c.length == 10));
    }

    #[test]
    fn remainder_goes_to_last_chunk() {
        let plan = plan_chunks(25, 10).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2], ChunkDescriptor { index: 2, offset: 20, length: 5 });
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(plan_chunks(100, 0), Err(Error::Configuration(_))));
    }

    proptest! {
        #[test]
        fn chunks_partition_the_source(total in 0u64..200_000, size in 1usize..5_000) {
            let plan = plan_chunks(total, size).unwrap();
            prop_assert_eq!(plan.len() as u64, total.div_ceil(size as u64));
            prop_assert_eq!(plan.iter().map(|c| c.length as u64).sum::<u64>(), total);

            let mut expected_offset = 0u64;
            for (i, c) in plan.iter().enumerate() {
                prop_assert_eq!(c.index, i);
                prop_assert_eq!(c.offset, expected_offset);
                prop_assert!(c.length > 0 && c.length <= size);
                expected_offset = c.offset + c.length as u64;
            }
        }
    }
}
