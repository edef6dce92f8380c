use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{UvsError, UvsResult};

/// The four content record kinds kept in an object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Segment,
    File,
    Tree,
    Snapshot,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Segment,
        ObjectKind::File,
        ObjectKind::Tree,
        ObjectKind::Snapshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Segment => "segment",
            ObjectKind::File => "file",
            ObjectKind::Tree => "tree",
            ObjectKind::Snapshot => "snapshot",
        }
    }

    /// Directory (or key prefix) used by persistent backends.
    pub fn collection(&self) -> &'static str {
        match self {
            ObjectKind::Segment => "segments",
            ObjectKind::File => "files",
            ObjectKind::Tree => "trees",
            ObjectKind::Snapshot => "snapshots",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record identifier: lower-case hex, two characters per digest byte.
///
/// Segment, file and tree ids are keyed fingerprints of their plaintext.
/// Snapshot ids have the same shape but are random.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

/// Snapshot ids share the id shape; the alias documents intent at call sites.
pub type SnapshotId = ObjectId;

impl ObjectId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        ObjectId(hex::encode(bytes))
    }

    /// Parse a hex id, rejecting empty, odd-length, upper-case or non-hex input.
    pub fn parse(s: &str) -> UvsResult<Self> {
        if Self::is_well_formed(s) {
            Ok(ObjectId(s.to_string()))
        } else {
            Err(UvsError::InvalidReference(format!("malformed object id '{s}'")))
        }
    }

    pub fn is_well_formed(s: &str) -> bool {
        !s.is_empty()
            && s.len() % 2 == 0
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest size in bytes.
    pub fn digest_len(&self) -> usize {
        self.0.len() / 2
    }

    /// First two hex characters, used to shard on-disk layouts.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl TryFrom<String> for ObjectId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if ObjectId::is_well_formed(&value) {
            Ok(ObjectId(value))
        } else {
            Err(format!("malformed object id '{value}'"))
        }
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
