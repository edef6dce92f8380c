use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::ObjectKind;

pub type UvsResult<T> = Result<T, UvsError>;

#[derive(Debug, Error)]
pub enum UvsError {
    /// Authentication failed. A wrong password and corrupted data look the same.
    #[error("tamper detected: authentication failed (wrong password or corrupted data)")]
    TamperDetected,

    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error("invalid file record: {0}")]
    InvalidFile(String),

    #[error("{kind} not found: {id}")]
    ObjectNotFound { kind: ObjectKind, id: String },

    #[error("invalid destination: {}", .0.display())]
    InvalidDestination(PathBuf),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("working directory has uncommitted changes")]
    DirtyWorkingDirectory,

    #[error("a merge is already in progress")]
    MergeInProgress,

    #[error("no merge in progress")]
    NoMergeInProgress,

    #[error("cannot merge branch '{0}' into itself")]
    SelfMerge(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UvsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UvsError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(kind: ObjectKind, id: impl ToString) -> Self {
        UvsError::ObjectNotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Attach the offending path to a `std::io::Result`.
pub trait IoResultExt<T> {
    fn at_path(self, path: &Path) -> UvsResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> UvsResult<T> {
        self.map_err(|e| UvsError::io(path, e))
    }
}
