//! Versioned plaintext records: files, trees, snapshots.
//!
//! Every record is a JSON object whose first field is `format`, a
//! `<kind>/<version>` tag. Unknown tags are rejected on read, so a future
//! layout can be introduced next to the current one without ambiguity.
//! Serialization is deterministic (fixed field order, sorted tree entries),
//! which keeps tree ids stable across runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use uvs_core::{ObjectId, SnapshotId, UvsError, UvsResult};

/// A plaintext record with a fixed format tag.
pub trait Record: Serialize + DeserializeOwned {
    const FORMAT: &'static str;

    /// Error for a record of this kind that does not parse or validate.
    fn invalid(reason: String) -> UvsError;

    /// Structural checks beyond what the JSON shape enforces.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Serialize)]
struct Tagged<'a, R> {
    format: &'static str,
    #[serde(flatten)]
    record: &'a R,
}

#[derive(Deserialize)]
struct Header {
    format: String,
}

/// Serialize `record` with its format tag.
pub fn encode<R: Record>(record: &R) -> UvsResult<Vec<u8>> {
    serde_json::to_vec(&Tagged {
        format: R::FORMAT,
        record,
    })
    .map_err(|e| R::invalid(format!("encoding: {e}")))
}

/// Parse and validate a record, rejecting any other format tag.
pub fn decode<R: Record>(bytes: &[u8]) -> UvsResult<R> {
    let header: Header =
        serde_json::from_slice(bytes).map_err(|e| R::invalid(format!("malformed: {e}")))?;
    if header.format != R::FORMAT {
        return Err(R::invalid(format!(
            "unsupported format '{}' (expected '{}')",
            header.format,
            R::FORMAT
        )));
    }
    let record: R =
        serde_json::from_slice(bytes).map_err(|e| R::invalid(format!("malformed: {e}")))?;
    record.check().map_err(R::invalid)?;
    Ok(record)
}

/// True if `name` can be stored as a tree entry and safely written back out.
pub fn valid_entry_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

// ── File ──────────────────────────────────────────────────────────────────────

/// One content-defined segment of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub id: ObjectId,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Fingerprint of the whole content; must equal the record's id
    pub verify_id: ObjectId,
    pub size: u64,
    /// Ordered, contiguous, covering `0..size`
    pub segments: Vec<SegmentRef>,
}

impl Record for FileRecord {
    const FORMAT: &'static str = "file/1";

    fn invalid(reason: String) -> UvsError {
        UvsError::InvalidFile(reason)
    }

    fn check(&self) -> Result<(), String> {
        let mut expected = 0u64;
        for seg in &self.segments {
            if seg.offset != expected {
                return Err(format!(
                    "segment {} at offset {} (expected {expected})",
                    seg.id, seg.offset
                ));
            }
            if seg.length == 0 {
                return Err(format!("empty segment {}", seg.id));
            }
            expected = expected
                .checked_add(seg.length)
                .ok_or_else(|| "segment lengths overflow".to_string())?;
        }
        if expected != self.size {
            return Err(format!(
                "segments cover {expected} bytes but size is {}",
                self.size
            ));
        }
        Ok(())
    }
}

// ── Tree ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub id: ObjectId,
}

/// A directory: named file ids and named subtree ids, each sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub files: Vec<TreeEntry>,
    pub subtrees: Vec<TreeEntry>,
}

impl TreeRecord {
    /// Build a tree, putting both lists in canonical order.
    pub fn new(mut files: Vec<TreeEntry>, mut subtrees: Vec<TreeEntry>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        subtrees.sort_by(|a, b| a.name.cmp(&b.name));
        Self { files, subtrees }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.subtrees.is_empty()
    }
}

fn check_entries(kind: &str, entries: &[TreeEntry]) -> Result<(), String> {
    for entry in entries {
        if !valid_entry_name(&entry.name) {
            return Err(format!("bad {kind} name {:?}", entry.name));
        }
    }
    for pair in entries.windows(2) {
        if pair[0].name >= pair[1].name {
            return Err(format!(
                "{kind} entries not strictly sorted at {:?}",
                pair[1].name
            ));
        }
    }
    Ok(())
}

impl Record for TreeRecord {
    const FORMAT: &'static str = "tree/1";

    fn invalid(reason: String) -> UvsError {
        UvsError::InvalidTree(reason)
    }

    fn check(&self) -> Result<(), String> {
        check_entries("file", &self.files)?;
        check_entries("subtree", &self.subtrees)?;
        let file_names: BTreeSet<&str> = self.files.iter().map(|e| e.name.as_str()).collect();
        if let Some(clash) = self
            .subtrees
            .iter()
            .find(|e| file_names.contains(e.name.as_str()))
        {
            return Err(format!("{:?} is both a file and a subtree", clash.name));
        }
        Ok(())
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Must equal the id the snapshot is stored under
    pub verify_id: SnapshotId,
    pub root_tree_id: ObjectId,
    pub message: String,
    pub author: Author,
    /// Empty for the first snapshot, two for a merge
    pub parents: Vec<SnapshotId>,
    /// Seconds since the Unix epoch
    pub created_at: u64,
}

impl Record for SnapshotRecord {
    const FORMAT: &'static str = "snapshot/1";

    fn invalid(reason: String) -> UvsError {
        UvsError::InvalidSnapshot(reason)
    }

    fn check(&self) -> Result<(), String> {
        if self.parents.len() > 2 {
            return Err(format!("{} parents (at most 2)", self.parents.len()));
        }
        if self.parents.len() == 2 && self.parents[0] == self.parents[1] {
            return Err("duplicate parent".into());
        }
        if self.parents.contains(&self.verify_id) {
            return Err("snapshot lists itself as a parent".into());
        }
        Ok(())
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes(&[byte; 16])
    }

    fn entry(name: &str, byte: u8) -> TreeEntry {
        TreeEntry {
            name: name.into(),
            id: id(byte),
        }
    }

    #[test]
    fn format_tag_comes_first() {
        let tree = TreeRecord::new(vec![entry("a", 1)], vec![]);
        let bytes = encode(&tree).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"format":"tree/1","files":"#), "{text}");
    }

    #[test]
    fn tree_roundtrip_and_canonical_order() {
        let a = TreeRecord::new(vec![entry("b", 2), entry("a", 1)], vec![entry("d", 3)]);
        let b = TreeRecord::new(vec![entry("a", 1), entry("b", 2)], vec![entry("d", 3)]);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
        assert_eq!(decode::<TreeRecord>(&encode(&a).unwrap()).unwrap(), a);
    }

    #[test]
    fn wrong_format_tag_is_rejected_per_kind() {
        let tree = encode(&TreeRecord::default()).unwrap();
        assert!(matches!(
            decode::<FileRecord>(&tree),
            Err(UvsError::InvalidFile(_))
        ));
        assert!(matches!(
            decode::<SnapshotRecord>(&tree),
            Err(UvsError::InvalidSnapshot(_))
        ));
        assert!(matches!(
            decode::<TreeRecord>(br#"{"format":"tree/2","files":[],"subtrees":[]}"#),
            Err(UvsError::InvalidTree(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_not_a_panic() {
        assert!(matches!(
            decode::<TreeRecord>(b"not json"),
            Err(UvsError::InvalidTree(_))
        ));
        assert!(matches!(
            decode::<FileRecord>(br#"{"format":"file/1"}"#),
            Err(UvsError::InvalidFile(_))
        ));
    }

    #[test]
    fn tree_rejects_unsafe_or_duplicate_names() {
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            let raw = format!(
                r#"{{"format":"tree/1","files":[{{"name":{:?},"id":"{}"}}],"subtrees":[]}}"#,
                bad,
                id(1)
            );
            assert!(
                matches!(decode::<TreeRecord>(raw.as_bytes()), Err(UvsError::InvalidTree(_))),
                "accepted {bad:?}"
            );
        }

        let dup = TreeRecord {
            files: vec![entry("x", 1), entry("x", 2)],
            subtrees: vec![],
        };
        assert!(dup.check().is_err());

        let clash = TreeRecord {
            files: vec![entry("x", 1)],
            subtrees: vec![entry("x", 2)],
        };
        assert!(clash.check().is_err());
    }

    #[test]
    fn file_segments_must_tile_the_content() {
        let good = FileRecord {
            verify_id: id(9),
            size: 10,
            segments: vec![
                SegmentRef { id: id(1), offset: 0, length: 4 },
                SegmentRef { id: id(2), offset: 4, length: 6 },
            ],
        };
        assert!(good.check().is_ok());

        let gap = FileRecord {
            segments: vec![
                SegmentRef { id: id(1), offset: 0, length: 4 },
                SegmentRef { id: id(2), offset: 5, length: 5 },
            ],
            ..good.clone()
        };
        assert!(gap.check().is_err());

        let short = FileRecord { size: 11, ..good };
        assert!(short.check().is_err());

        let empty = FileRecord {
            verify_id: id(9),
            size: 0,
            segments: vec![],
        };
        assert!(empty.check().is_ok());
    }

    #[test]
    fn snapshot_parent_rules() {
        let mut snap = SnapshotRecord {
            verify_id: id(5),
            root_tree_id: id(6),
            message: "m".into(),
            author: Author::new("a", "a@example.org"),
            parents: vec![id(1), id(2)],
            created_at: 1,
        };
        assert!(snap.check().is_ok());

        snap.parents = vec![id(1), id(1)];
        assert!(snap.check().is_err());

        snap.parents = vec![id(1), id(2), id(3)];
        assert!(snap.check().is_err());

        snap.parents = vec![id(5)];
        assert!(snap.check().is_err());
    }
}
