//! Content-addressed segments (spec.md §3, §4.2).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SerializationError};
use crate::ids::{SegmentSha, VersionId};

/// A single compressed, content-addressed chunk of column data.
///
/// Segments are immutable once written and may be shared across versions
/// via `parent_versions` when two writes produce identical bytes for the
/// same symbol and segment index (spec.md §4.2 dedup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Owning symbol.
    pub symbol: String,
    /// Position of this segment within its table's column layout.
    pub segment_index: u32,
    /// Content hash over `(symbol, segment_index, uncompressed bytes)`.
    pub sha: SegmentSha,
    /// Versions that currently reference this segment.
    pub parent_versions: BTreeSet<VersionId>,
    /// LZ4-compressed payload bytes.
    pub compressed_bytes: Vec<u8>,
    /// Length of the uncompressed payload, needed by the LZ4 block decoder.
    pub uncompressed_len: usize,
}

impl Segment {
    /// Compress `uncompressed` and compute its content hash, producing a
    /// segment not yet attached to any version.
    pub fn new(symbol: &str, segment_index: u32, uncompressed: &[u8]) -> Self {
        let sha = SegmentSha::compute(symbol, segment_index, uncompressed);
        let compressed_bytes = lz4_flex::compress_prepend_size(uncompressed);
        Self {
            symbol: symbol.to_string(),
            segment_index,
            sha,
            parent_versions: BTreeSet::new(),
            compressed_bytes,
            uncompressed_len: uncompressed.len(),
        }
    }

    /// Decompress this segment's payload back to its original bytes.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(&self.compressed_bytes).map_err(|e| {
            Error::Serialization(SerializationError::Decompress(format!(
                "segment {}/{}: {e}",
                self.symbol, self.segment_index
            )))
        })
    }

    /// Whether this segment is still referenced by at least one version.
    pub fn is_referenced(&self) -> bool {
        !self.parent_versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_compression() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let segment = Segment::new("AAPL", 0, &payload);
        assert_eq!(segment.decompress().unwrap(), payload);
    }

    #[test]
    fn identical_bytes_produce_identical_sha() {
        let a = Segment::new("AAPL", 0, b"data");
        let b = Segment::new("AAPL", 0, b"data");
        assert_eq!(a.sha, b.sha);
    }

    #[test]
    fn fresh_segment_has_no_parents() {
        let segment = Segment::new("AAPL", 0, b"data");
        assert!(!segment.is_referenced());
    }
}
