//! FastCDC content-defined segmenting
//!
//! Splits file content into variable-size segments whose boundaries are
//! content-defined, so inserting bytes near the start of a file does not
//! shift every later segment. Repositories default to min 2KB, avg 4KB,
//! max 8KB (see `SegmentConfig`).
//!
//! Segments are addressed by the repository's keyed fingerprint, which the
//! caller computes; nothing here hashes content.

use uvs_core::config::SegmentConfig;

/// A contiguous byte range of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset within the file
    pub offset: u64,
    /// Segment length in bytes
    pub length: usize,
}

impl Segment {
    /// Borrow this segment's bytes out of the whole file content.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.offset as usize;
        &data[start..start + self.length]
    }
}

/// Split `data` into content-defined segments.
///
/// Returns an empty list for empty data. Sizes must satisfy FastCDC's
/// bounds, which `RepositoryConfig::validate` enforces.
pub fn segment_data(data: &[u8], sizes: &SegmentConfig) -> Vec<Segment> {
    if data.is_empty() {
        return vec![];
    }

    fastcdc::v2020::FastCDC::new(data, sizes.min_size, sizes.avg_size, sizes.max_size)
        .map(|c| Segment {
            offset: c.offset as u64,
            length: c.length,
        })
        .collect()
}
