//! uvs-repo: encrypted snapshots of a working directory, with branches and merges
//!
//! Layers, bottom up:
//!   - [`records`]: versioned plaintext records (file, tree, snapshot)
//!   - [`walk`]: directory walk that segments, fingerprints and encrypts
//!   - [`Repository`]: init/open, snapshot, checkout, branches, history
//!   - [`dag`]: history graph and common-ancestor search
//!   - [`merge`]: fast-forward and three-way directory merge
//!
//! The object store only ever sees ciphertext under keyed fingerprints.

pub mod checkout;
pub mod dag;
pub mod manager;
pub mod merge;
pub(crate) mod objects;
pub mod public;
pub mod records;
pub mod refs;
pub mod walk;

pub use dag::Dag;
pub use manager::{RepoStatus, Repository};
pub use merge::{
    Diff3Tool, FileMergeStatus, FileMerger, MergeEngine, MergeOutcome, MergeReport, PendingMerge,
};
pub use records::{Author, FileRecord, SnapshotRecord, TreeRecord};
pub use refs::{Head, ReferenceDocument};
pub use walk::WalkStats;
