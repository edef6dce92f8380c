//! uvs-chunks: content-defined segmenting and local file comparison
//!
//! # Overview
//! - `segment`: FastCDC splitting of file content into segments; boundaries
//!   are content-defined so an edit only disturbs nearby segments
//! - `compare`: unkeyed BLAKE3 comparison of local files, used while merging
//!   scratch checkouts. These digests are never persisted.

pub mod compare;
pub mod segment;

pub use compare::{files_identical, hash_file_streaming};
pub use segment::{segment_data, Segment};
