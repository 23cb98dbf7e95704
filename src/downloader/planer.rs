use std::fmt;

/// An inclusive byte span `[start, end]` of the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn range_header(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Partition `[0, total_length)` into ascending chunks of at most `chunk_size`
/// bytes. Only the last chunk may be shorter.
pub fn plan(total_length: u64, chunk_size: u64) -> Vec<Chunk> {
    debug_assert!(chunk_size > 0, "chunk_size must be positive");
    let chunk_size = chunk_size.max(1);

    let count = usize::try_from(total_length.div_ceil(chunk_size)).unwrap_or(0);
    let mut chunks = Vec::with_capacity(count);
    let mut start = 0;
    while start < total_length {
        let end = start
            .saturating_add(chunk_size - 1)
            .min(total_length - 1);
        chunks.push(Chunk { start, end });
        start = end + 1;
    }
    chunks
}
