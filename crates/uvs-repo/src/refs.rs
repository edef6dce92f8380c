//! Branch pointers and the head.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use uvs_core::{SnapshotId, UvsError};

use crate::records::Record;

/// Where the working directory's next snapshot attaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Head {
    /// Following a branch; committing advances the branch.
    Attached { branch: String },
    /// Parked on a specific snapshot.
    Detached { snapshot: SnapshotId },
}

impl Head {
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Attached { branch } => Some(branch),
            Head::Detached { .. } => None,
        }
    }

    pub fn is_attached_to(&self, name: &str) -> bool {
        self.branch() == Some(name)
    }
}

impl std::fmt::Display for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Head::Attached { branch } => write!(f, "branch {branch}"),
            Head::Detached { snapshot } => write!(f, "detached at {}", snapshot.short()),
        }
    }
}

/// Mutable pointer state, stored encrypted and overwritten as a whole.
///
/// A branch exists in `branches` only once it points at a snapshot; the
/// head may be attached to a branch that has none yet (a fresh repository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    pub branches: BTreeMap<String, SnapshotId>,
    pub head: Head,
}

impl ReferenceDocument {
    pub fn new(default_branch: &str) -> Self {
        Self {
            branches: BTreeMap::new(),
            head: Head::Attached {
                branch: default_branch.to_string(),
            },
        }
    }

    /// Snapshot the head currently denotes, if any.
    pub fn head_snapshot(&self) -> Option<&SnapshotId> {
        match &self.head {
            Head::Attached { branch } => self.branches.get(branch),
            Head::Detached { snapshot } => Some(snapshot),
        }
    }

    /// Record a new snapshot at the head: move the attached branch, or
    /// re-park a detached head.
    pub fn advance_head(&mut self, id: SnapshotId) {
        match &mut self.head {
            Head::Attached { branch } => {
                self.branches.insert(branch.clone(), id);
            }
            Head::Detached { snapshot } => *snapshot = id,
        }
    }

    /// Every snapshot some pointer refers to.
    pub fn referenced(&self) -> impl Iterator<Item = &SnapshotId> {
        let detached = match &self.head {
            Head::Detached { snapshot } => Some(snapshot),
            Head::Attached { .. } => None,
        };
        self.branches.values().chain(detached)
    }
}

impl Record for ReferenceDocument {
    const FORMAT: &'static str = "refs/1";

    fn invalid(reason: String) -> UvsError {
        UvsError::InvalidRepository(format!("reference document: {reason}"))
    }

    fn check(&self) -> Result<(), String> {
        if let Head::Attached { branch } = &self.head {
            if branch.is_empty() {
                return Err("head attached to an empty branch name".into());
            }
        }
        Ok(())
    }
}
