//! Reference implementations of the `Chunker` collaborator (SPEC_FULL.md
//! §4.6). The chunker that splits file bytes into content-defined chunks is
//! explicitly out of scope for the core engine, but without *some*
//! implementation the rest of the crate can't be exercised end-to-end, so
//! two minimal ones are provided here.

/// A produced chunk: its offset within the file and its bytes.
pub struct ChunkBytes {
    pub start: u64,
    pub data: Vec<u8>,
}

pub trait Chunker {
    /// Split `data` (a whole file's bytes) into an ordered sequence of
    /// chunks. An empty input yields zero chunks.
    fn chunk(&mut self, data: &[u8]) -> Vec<ChunkBytes>;
}

/// Splits at fixed byte boundaries. The last chunk may be shorter than
/// `size`. Grounded on the teacher's `file_chunker` fixed-size splitting
/// helper, adapted to operate on an in-memory buffer.
pub struct FixedSizeChunker {
    size: usize,
}

impl FixedSizeChunker {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "chunk size must be non-zero");
        FixedSizeChunker { size }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&mut self, data: &[u8]) -> Vec<ChunkBytes> {
        if data.is_empty() {
            return Vec::new();
        }
        data.chunks(self.size)
            .scan(0u64, |offset, slice| {
                let start = *offset;
                *offset += slice.len() as u64;
                Some(ChunkBytes {
                    start,
                    data: slice.to_vec(),
                })
            })
            .collect()
    }
}

const WINDOW_SIZE: usize = 64;

/// Content-defined chunking via a Buzhash-style rolling checksum: a
/// boundary is cut wherever the low bits of the rolling hash over the last
/// `WINDOW_SIZE` bytes match a mask derived from `target_size`, bounded by a
/// hard minimum and maximum so pathological input cannot produce degenerate
/// chunks.
pub struct RollingHashChunker {
    target_size: usize,
    min_size: usize,
    max_size: usize,
    mask: u32,
}

impl RollingHashChunker {
    pub fn new(target_size: usize) -> Self {
        assert!(target_size >= WINDOW_SIZE, "target size too small");
        let bits = (target_size as f64).log2().round() as u32;
        RollingHashChunker {
            target_size,
            min_size: target_size / 4,
            max_size: target_size * 4,
            mask: (1u32 << bits.max(1)) - 1,
        }
    }

    fn rolling_hash(window: &[u8]) -> u32 {
        let mut h: u32 = 0;
        for &b in window {
            h = h.rotate_left(1) ^ (b as u32).wrapping_mul(0x9E3779B1);
        }
        h
    }
}

impl Chunker for RollingHashChunker {
    fn chunk(&mut self, data: &[u8]) -> Vec<ChunkBytes> {
        if data.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut chunk_start = 0usize;
        let mut pos = 0usize;

        while pos < data.len() {
            let chunk_len = pos - chunk_start;
            let at_window_edge = chunk_len + 1 >= WINDOW_SIZE;
            let reached_target = chunk_len + 1 >= self.min_size;
            let reached_max = chunk_len + 1 >= self.max_size;

            let boundary = reached_max
                || (reached_target
                    && at_window_edge
                    && {
                        let window_start = pos + 1 - WINDOW_SIZE;
                        let hash = Self::rolling_hash(&data[window_start..=pos]);
                        hash & self.mask == self.mask
                    });

            pos += 1;

            if boundary || pos == data.len() {
                chunks.push(ChunkBytes {
                    start: chunk_start as u64,
                    data: data[chunk_start..pos].to_vec(),
                });
                chunk_start = pos;
            }
        }

        chunks
    }
}
