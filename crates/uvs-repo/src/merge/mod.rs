//! Branch merging.
//!
//! `merge` classifies the two branch heads through the history DAG:
//!   - source already contained in current: nothing to do
//!   - current contained in source: fast-forward the branch pointer
//!   - otherwise: materialize both heads and their merge base into scratch
//!     directories, merge them into `.uvs/temp/merge_result/` and leave a
//!     pending-merge marker for `finalize_merge` or `abort_merge`.
//!
//! A prepared merge never touches the object store or the working directory;
//! only finalizing does.

pub mod tool;
pub mod tree;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use uvs_core::{IoResultExt, SnapshotId, UvsError, UvsResult};

use crate::checkout::clear_directory;
use crate::dag::{find_merge_base, is_descendant};
use crate::manager::Repository;
use crate::records::Author;

pub use tool::{Diff3Tool, FileMergeStatus, FileMerger};
pub use tree::{conflict_text, DirMergeReport};

/// A prepared, not yet finalized merge. Persisted as JSON next to the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMerge {
    pub current_branch: String,
    pub source_branch: String,
    pub current_snapshot: SnapshotId,
    pub source_snapshot: SnapshotId,
    pub base: SnapshotId,
    pub hard_conflicts: bool,
    pub trouble: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub base: SnapshotId,
    /// Some files carry conflict markers
    pub hard_conflicts: bool,
    /// Some paths could not be merged at all
    pub trouble: bool,
    pub conflicted_paths: Vec<PathBuf>,
    pub troubled_paths: Vec<PathBuf>,
    pub result_dir: PathBuf,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        !self.hard_conflicts && !self.trouble
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The source head is already part of the current branch's history.
    UpToDate,
    /// The current branch was moved forward to the source head.
    FastForward { from: SnapshotId, to: SnapshotId },
    /// A three-way merge was prepared and awaits finalization.
    Merged(MergeReport),
}

pub struct MergeEngine<'r, M: FileMerger = Diff3Tool> {
    repo: &'r mut Repository,
    merger: M,
}

impl<'r> MergeEngine<'r, Diff3Tool> {
    pub fn new(repo: &'r mut Repository) -> Self {
        Self::with_merger(repo, Diff3Tool::default())
    }
}

impl<'r, M: FileMerger> MergeEngine<'r, M> {
    pub fn with_merger(repo: &'r mut Repository, merger: M) -> Self {
        Self { repo, merger }
    }

    /// The merge awaiting finalization, if any.
    pub fn pending(&self) -> UvsResult<Option<PendingMerge>> {
        let path = self.repo.layout().pending_merge_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(UvsError::io(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| UvsError::InvalidRepository(format!("pending merge state: {e}")))
    }

    /// Merge `source_branch` into `current_branch`.
    pub fn merge(&mut self, current_branch: &str, source_branch: &str) -> UvsResult<MergeOutcome> {
        if current_branch == source_branch {
            return Err(UvsError::SelfMerge(current_branch.to_string()));
        }
        if self.pending()?.is_some() {
            return Err(UvsError::MergeInProgress);
        }

        let mut refs = self.repo.load_refs()?;
        let branch_head = |name: &str| {
            refs.branches.get(name).cloned().ok_or_else(|| {
                UvsError::InvalidReference(format!("branch '{name}' has no snapshots"))
            })
        };
        let current = branch_head(current_branch)?;
        let source = branch_head(source_branch)?;

        if current == source {
            return Ok(MergeOutcome::UpToDate);
        }

        let dag = self.repo.history_dag()?;
        let inverted = dag.inverted();

        if is_descendant(&inverted, &source, &current) {
            info!(current = %current_branch, source = %source_branch, "already up to date");
            return Ok(MergeOutcome::UpToDate);
        }

        if is_descendant(&inverted, &current, &source) {
            let checked_out = refs.head.is_attached_to(current_branch);
            if checked_out && self.repo.status()?.dirty {
                return Err(UvsError::DirtyWorkingDirectory);
            }
            refs.branches
                .insert(current_branch.to_string(), source.clone());
            self.repo.save_refs(&refs)?;
            if checked_out {
                let root = self.repo.root().to_path_buf();
                self.repo.checkout_into(&source, &root, true)?;
            }
            info!(
                branch = %current_branch,
                from = %current.short(),
                to = %source.short(),
                "fast-forward"
            );
            return Ok(MergeOutcome::FastForward {
                from: current,
                to: source,
            });
        }

        if !refs.head.is_attached_to(current_branch) {
            return Err(UvsError::InvalidReference(format!(
                "merging into '{current_branch}' requires it to be checked out"
            )));
        }
        if self.repo.status()?.dirty {
            return Err(UvsError::DirtyWorkingDirectory);
        }

        let base = find_merge_base(&dag, &current, &source);
        debug!(base = %base.short(), "merge base");
        let report = self.prepare(current_branch, source_branch, &current, &source, &base)?;

        let pending = PendingMerge {
            current_branch: current_branch.to_string(),
            source_branch: source_branch.to_string(),
            current_snapshot: current,
            source_snapshot: source,
            base: base.clone(),
            hard_conflicts: report.hard_conflicts(),
            trouble: report.trouble(),
        };
        self.write_pending(&pending)?;

        let result_dir = self.repo.layout().merge_result_dir();
        info!(
            current = %current_branch,
            source = %source_branch,
            conflicts = report.conflicted.len(),
            trouble = report.troubled.len(),
            result = %result_dir.display(),
            "merge prepared"
        );
        Ok(MergeOutcome::Merged(MergeReport {
            base,
            hard_conflicts: pending.hard_conflicts,
            trouble: pending.trouble,
            conflicted_paths: report.conflicted,
            troubled_paths: report.troubled,
            result_dir,
        }))
    }

    /// Materialize the three snapshots into scratch space and merge them.
    fn prepare(
        &self,
        current_branch: &str,
        source_branch: &str,
        current: &SnapshotId,
        source: &SnapshotId,
        base: &SnapshotId,
    ) -> UvsResult<DirMergeReport> {
        let temp = self.repo.internal_temp_dir()?;
        let result_dir = self.repo.layout().merge_result_dir();
        if result_dir.exists() {
            std::fs::remove_dir_all(&result_dir).at_path(&result_dir)?;
        }

        let scratch = tempfile::Builder::new()
            .prefix("merge-")
            .tempdir_in(&temp)
            .at_path(&temp)?;
        let ancestor_dir = scratch.path().join("common_ancestor");
        let current_dir = scratch.path().join("current");
        let source_dir = scratch.path().join("source");
        self.repo.checkout_into(base, &ancestor_dir, false)?;
        self.repo.checkout_into(current, &current_dir, false)?;
        self.repo.checkout_into(source, &source_dir, false)?;

        let report = tree::DirMerge::new(&self.merger, current_branch, source_branch).run(
            &ancestor_dir,
            &current_dir,
            &source_dir,
            &result_dir,
        );
        Ok(report)
    }

    fn write_pending(&self, pending: &PendingMerge) -> UvsResult<()> {
        let path = self.repo.layout().pending_merge_path();
        let dir = self.repo.internal_temp_dir()?;
        let bytes = serde_json::to_vec_pretty(pending)
            .map_err(|e| UvsError::Other(anyhow::anyhow!("serializing pending merge: {e}")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).at_path(&dir)?;
        std::io::Write::write_all(&mut tmp, &bytes).at_path(tmp.path())?;
        tmp.persist(&path).map_err(|e| UvsError::io(&path, e.error))?;
        Ok(())
    }

    /// Replace the working directory with the merge result and record it as
    /// a snapshot with both branch heads as parents.
    pub fn finalize_merge(&mut self, message: &str, author: &Author) -> UvsResult<SnapshotId> {
        let pending = self.pending()?.ok_or(UvsError::NoMergeInProgress)?;
        let refs = self.repo.load_refs()?;

        if refs.branches.get(&pending.current_branch) != Some(&pending.current_snapshot) {
            return Err(UvsError::InvalidReference(format!(
                "branch '{}' moved since the merge was prepared",
                pending.current_branch
            )));
        }
        if !refs.head.is_attached_to(&pending.current_branch) {
            return Err(UvsError::InvalidReference(format!(
                "finalizing requires '{}' to be checked out",
                pending.current_branch
            )));
        }

        let result_dir = self.repo.layout().merge_result_dir();
        if !result_dir.is_dir() {
            return Err(UvsError::InvalidRepository(format!(
                "merge result missing at {}",
                result_dir.display()
            )));
        }

        let root = self.repo.root().to_path_buf();
        clear_directory(&root)?;
        move_contents(&result_dir, &root)?;

        let id = self.repo.snapshot_with_parents(
            refs,
            message,
            author,
            vec![pending.current_snapshot.clone(), pending.source_snapshot.clone()],
        )?;
        self.discard_pending()?;

        info!(
            snapshot = %id.short(),
            current = %pending.current_branch,
            source = %pending.source_branch,
            "merge finalized"
        );
        Ok(id)
    }

    /// Drop a prepared merge. The working directory is left as it is.
    pub fn abort_merge(&mut self) -> UvsResult<()> {
        let pending = self.pending()?.ok_or(UvsError::NoMergeInProgress)?;
        self.discard_pending()?;
        info!(
            current = %pending.current_branch,
            source = %pending.source_branch,
            "merge aborted"
        );
        Ok(())
    }

    fn discard_pending(&self) -> UvsResult<()> {
        let layout = self.repo.layout();
        let result_dir = layout.merge_result_dir();
        if result_dir.exists() {
            std::fs::remove_dir_all(&result_dir).at_path(&result_dir)?;
        }
        let path = layout.pending_merge_path();
        std::fs::remove_file(&path).at_path(&path)
    }
}

/// Move every entry of `from` into `to` (same filesystem).
fn move_contents(from: &Path, to: &Path) -> UvsResult<()> {
    for entry in std::fs::read_dir(from).at_path(from)? {
        let entry = entry.at_path(from)?;
        let target = to.join(entry.file_name());
        std::fs::rename(entry.path(), &target).at_path(&target)?;
    }
    Ok(())
}
