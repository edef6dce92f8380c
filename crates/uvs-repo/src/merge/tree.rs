//! Recursive three-way merge of materialized directories.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use uvs_chunks::files_identical;

use super::tool::{FileMergeStatus, FileMerger};

/// Per-path results of a directory merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirMergeReport {
    /// Paths written with conflict markers
    pub conflicted: Vec<PathBuf>,
    /// Paths that could not be merged at all
    pub troubled: Vec<PathBuf>,
}

impl DirMergeReport {
    pub fn hard_conflicts(&self) -> bool {
        !self.conflicted.is_empty()
    }

    pub fn trouble(&self) -> bool {
        !self.troubled.is_empty()
    }
}

#[derive(Default)]
struct Listing {
    files: BTreeSet<OsString>,
    dirs: BTreeSet<OsString>,
}

/// Merges `current` and `source` against `ancestor` into `output`.
pub(crate) struct DirMerge<'a> {
    merger: &'a dyn FileMerger,
    current_label: &'a str,
    source_label: &'a str,
    report: DirMergeReport,
}

impl<'a> DirMerge<'a> {
    pub fn new(merger: &'a dyn FileMerger, current_label: &'a str, source_label: &'a str) -> Self {
        Self {
            merger,
            current_label,
            source_label,
            report: DirMergeReport::default(),
        }
    }

    pub fn run(
        mut self,
        ancestor: &Path,
        current: &Path,
        source: &Path,
        output: &Path,
    ) -> DirMergeReport {
        self.merge_dir(
            Path::new(""),
            Some(ancestor),
            Some(current),
            Some(source),
            output,
        );
        self.report
    }

    fn trouble(&mut self, rel: PathBuf, why: impl std::fmt::Display) {
        warn!(path = %rel.display(), "merge trouble: {why}");
        self.report.troubled.push(rel);
    }

    /// Entries of `dir`; a side that lacks the directory lists as empty.
    fn list(&mut self, rel: &Path, dir: Option<&Path>) -> Listing {
        let mut listing = Listing::default();
        let Some(dir) = dir else {
            return listing;
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return listing,
            Err(e) => {
                self.trouble(rel.to_path_buf(), format!("reading {}: {e}", dir.display()));
                return listing;
            }
        };
        for entry in entries.flatten() {
            match entry.file_type() {
                Ok(t) if t.is_dir() => {
                    listing.dirs.insert(entry.file_name());
                }
                Ok(_) => {
                    listing.files.insert(entry.file_name());
                }
                Err(e) => self.trouble(rel.join(entry.file_name()), e),
            }
        }
        listing
    }

    fn merge_dir(
        &mut self,
        rel: &Path,
        ancestor: Option<&Path>,
        current: Option<&Path>,
        source: Option<&Path>,
        output: &Path,
    ) {
        if let Err(e) = std::fs::create_dir_all(output) {
            self.trouble(rel.to_path_buf(), format!("creating {}: {e}", output.display()));
            return;
        }

        let base = self.list(rel, ancestor);
        let ours = self.list(rel, current);
        let theirs = self.list(rel, source);

        let names: BTreeSet<&OsString> = ours.files.iter().chain(&theirs.files).collect();
        for name in names {
            let path = rel.join(name);
            if ours.dirs.contains(name) || theirs.dirs.contains(name) {
                self.trouble(path, "file on one side, directory on the other");
                continue;
            }
            let target = output.join(name);
            let pick = |dir: Option<&Path>, listing: &Listing| {
                dir.filter(|_| listing.files.contains(name))
                    .map(|d| d.join(name))
            };

            match (pick(current, &ours), pick(source, &theirs), pick(ancestor, &base)) {
                (Some(ours_file), None, _) => self.copy(path, &ours_file, &target),
                (None, Some(theirs_file), _) => self.copy(path, &theirs_file, &target),
                (Some(ours_file), Some(theirs_file), Some(base_file)) => {
                    self.merge_file(path, &base_file, &ours_file, &theirs_file, &target)
                }
                (Some(ours_file), Some(theirs_file), None) => {
                    self.merge_added(path, &ours_file, &theirs_file, &target)
                }
                (None, None, _) => {}
            }
        }

        let dirs: BTreeSet<&OsString> = ours.dirs.iter().chain(&theirs.dirs).collect();
        for name in dirs {
            // Clashes with a file were reported above; still merge the directory
            let pick = |dir: Option<&Path>, listing: &Listing| {
                dir.filter(|_| listing.dirs.contains(name))
                    .map(|d| d.join(name))
            };
            let (a, c, s) = (pick(ancestor, &base), pick(current, &ours), pick(source, &theirs));
            self.merge_dir(
                &rel.join(name),
                a.as_deref(),
                c.as_deref(),
                s.as_deref(),
                &output.join(name),
            );
        }
    }

    fn copy(&mut self, rel: PathBuf, from: &Path, to: &Path) {
        if let Err(e) = std::fs::copy(from, to) {
            self.trouble(rel, format!("copying {}: {e}", from.display()));
        }
    }

    fn same(&mut self, rel: &Path, a: &Path, b: &Path) -> Option<bool> {
        match files_identical(a, b) {
            Ok(same) => Some(same),
            Err(e) => {
                self.trouble(rel.to_path_buf(), e);
                None
            }
        }
    }

    /// Present in ancestor and both sides.
    fn merge_file(&mut self, rel: PathBuf, base: &Path, ours: &Path, theirs: &Path, to: &Path) {
        let Some(same_sides) = self.same(&rel, ours, theirs) else {
            return;
        };
        if same_sides {
            return self.copy(rel, ours, to);
        }
        let Some(ours_unchanged) = self.same(&rel, base, ours) else {
            return;
        };
        if ours_unchanged {
            return self.copy(rel, theirs, to);
        }
        let Some(theirs_unchanged) = self.same(&rel, base, theirs) else {
            return;
        };
        if theirs_unchanged {
            return self.copy(rel, ours, to);
        }

        match self.merger.merge_files(ours, base, theirs, to) {
            FileMergeStatus::Clean => debug!(path = %rel.display(), "merged cleanly"),
            FileMergeStatus::Conflicted => self.report.conflicted.push(rel),
            FileMergeStatus::Failed(why) => self.trouble(rel, why),
        }
    }

    /// Added independently on both sides.
    fn merge_added(&mut self, rel: PathBuf, ours: &Path, theirs: &Path, to: &Path) {
        let Some(same) = self.same(&rel, ours, theirs) else {
            return;
        };
        if same {
            return self.copy(rel, ours, to);
        }
        let written = std::fs::read(ours).and_then(|a| {
            let b = std::fs::read(theirs)?;
            std::fs::write(to, conflict_text(&a, &b, self.current_label, self.source_label))
        });
        match written {
            Ok(()) => self.report.conflicted.push(rel),
            Err(e) => self.trouble(rel, e),
        }
    }
}

/// Conflict-marker file for two versions with no common ancestor.
pub fn conflict_text(
    current: &[u8],
    source: &[u8],
    current_label: &str,
    source_label: &str,
) -> Vec<u8> {
    fn side(buf: &mut Vec<u8>, content: &[u8]) {
        buf.extend_from_slice(content);
        if !content.is_empty() && !content.ends_with(b"\n") {
            buf.push(b'\n');
        }
    }

    let mut buf = Vec::with_capacity(current.len() + source.len() + 128);
    buf.extend_from_slice(format!("<<<<<<< {current_label}\n").as_bytes());
    side(&mut buf, current);
    buf.extend_from_slice(b"||||||| no common ancestor\n");
    buf.extend_from_slice(b"=======\n");
    side(&mut buf, source);
    buf.extend_from_slice(format!(">>>>>>> {source_label}\n").as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Refuses every real merge so tests notice when it is reached.
    struct Unreachable;

    impl FileMerger for Unreachable {
        fn merge_files(&self, _: &Path, _: &Path, _: &Path, _: &Path) -> FileMergeStatus {
            FileMergeStatus::Failed("merge tool should not run".into())
        }
    }

    struct Sides {
        _dir: tempfile::TempDir,
        base: PathBuf,
        ours: PathBuf,
        theirs: PathBuf,
        out: PathBuf,
    }

    fn sides() -> Sides {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().to_path_buf();
        for d in ["base", "ours", "theirs"] {
            std::fs::create_dir(p.join(d)).unwrap();
        }
        Sides {
            base: p.join("base"),
            ours: p.join("ours"),
            theirs: p.join("theirs"),
            out: p.join("out"),
            _dir: dir,
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn run(s: &Sides) -> DirMergeReport {
        DirMerge::new(&Unreachable, "master", "feature").run(&s.base, &s.ours, &s.theirs, &s.out)
    }

    #[test]
    fn one_sided_changes_need_no_tool() {
        let s = sides();
        for d in [&s.base, &s.ours, &s.theirs] {
            write(d, "same.txt", "same\n");
            write(d, "a.txt", "base\n");
            write(d, "b.txt", "base\n");
        }
        write(&s.ours, "a.txt", "ours\n");
        write(&s.theirs, "b.txt", "theirs\n");
        write(&s.theirs, "sub/new.txt", "new\n");

        let report = run(&s);
        assert_eq!(report, DirMergeReport::default());
        assert_eq!(std::fs::read_to_string(s.out.join("a.txt")).unwrap(), "ours\n");
        assert_eq!(std::fs::read_to_string(s.out.join("b.txt")).unwrap(), "theirs\n");
        assert_eq!(std::fs::read_to_string(s.out.join("same.txt")).unwrap(), "same\n");
        assert_eq!(std::fs::read_to_string(s.out.join("sub/new.txt")).unwrap(), "new\n");
    }

    #[test]
    fn both_added_differently_writes_markers() {
        let s = sides();
        write(&s.ours, "x.txt", "mine");
        write(&s.theirs, "x.txt", "yours\n");

        let report = run(&s);
        assert_eq!(report.conflicted, vec![PathBuf::from("x.txt")]);
        assert!(report.hard_conflicts());
        assert_eq!(
            std::fs::read_to_string(s.out.join("x.txt")).unwrap(),
            "<<<<<<< master\nmine\n||||||| no common ancestor\n=======\nyours\n>>>>>>> feature\n"
        );
    }

    #[test]
    fn both_added_identically_is_clean() {
        let s = sides();
        write(&s.ours, "x.txt", "same");
        write(&s.theirs, "x.txt", "same");
        assert_eq!(run(&s), DirMergeReport::default());
    }

    #[test]
    fn edits_on_both_sides_reach_the_tool() {
        let s = sides();
        write(&s.base, "f", "base\n");
        write(&s.ours, "f", "ours\n");
        write(&s.theirs, "f", "theirs\n");

        let report = run(&s);
        assert_eq!(report.troubled, vec![PathBuf::from("f")]);
    }

    #[test]
    fn file_directory_clash_is_trouble() {
        let s = sides();
        write(&s.ours, "thing", "file");
        write(&s.theirs, "thing/inner.txt", "dir");

        let report = run(&s);
        assert!(report.trouble());
        assert_eq!(report.troubled, vec![PathBuf::from("thing")]);
        assert!(s.out.join("thing/inner.txt").is_file());
    }

    #[test]
    fn empty_files_conflict_without_blank_lines() {
        assert_eq!(
            conflict_text(b"", b"b\n", "x", "y"),
            b"<<<<<<< x\n||||||| no common ancestor\n=======\nb\n>>>>>>> y\n"
        );
    }
}
