//! Merge engine scenarios: up to date, fast-forward, prepared three-way
//! merges with and without conflicts, finalize and abort.

mod common;

use std::cell::Cell;
use std::path::Path;

use common::{digest_dir, list_files, Fixture};
use uvs_core::UvsError;
use uvs_repo::{FileMergeStatus, FileMerger, MergeEngine, MergeOutcome, MergeReport};
use uvs_store::ObjectStore;

/// File merger that writes fixed content and reports a fixed status.
struct Scripted {
    status: FileMergeStatus,
    content: &'static str,
    calls: Cell<usize>,
}

impl Scripted {
    fn new(status: FileMergeStatus, content: &'static str) -> Self {
        Self {
            status,
            content,
            calls: Cell::new(0),
        }
    }
}

impl FileMerger for Scripted {
    fn merge_files(&self, _: &Path, _: &Path, _: &Path, output: &Path) -> FileMergeStatus {
        self.calls.set(self.calls.get() + 1);
        std::fs::write(output, self.content).expect("write merge output");
        self.status.clone()
    }
}

fn never_called() -> Scripted {
    Scripted::new(FileMergeStatus::Failed("merge tool invoked".into()), "")
}

/// master and feature both start from `base` with shared.txt and notes.txt.
fn diverged() -> Fixture {
    let mut fx = Fixture::new();
    fx.write("shared.txt", "line 1\nline 2\nline 3\n");
    fx.write("notes.txt", "base notes\n");
    fx.commit("base");
    fx.repo.create_branch("feature", true).unwrap();

    fx.write("feature_only.txt", "from feature\n");
    fx.write("notes.txt", "feature notes\n");
    fx.commit("feature work");

    fx.repo.checkout("master", true).unwrap();
    fx.write("master_only.txt", "from master\n");
    fx.commit("master work");
    fx
}

fn expect_merged(outcome: MergeOutcome) -> MergeReport {
    match outcome {
        MergeOutcome::Merged(report) => report,
        other => panic!("expected a prepared merge, got {other:?}"),
    }
}

#[test]
fn merging_a_branch_into_itself_is_refused() {
    let mut fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.commit("a");
    let result = MergeEngine::new(&mut fx.repo).merge("master", "master");
    assert!(matches!(result, Err(UvsError::SelfMerge(_))));
}

#[test]
fn merging_an_ancestor_is_up_to_date_and_writes_nothing() {
    let mut fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.commit("base");
    fx.repo.create_branch("old", false).unwrap();
    fx.write("a.txt", "newer");
    fx.commit("newer");

    let shadow = fx.root().join(".uvs/shadow");
    let before = digest_dir(&shadow);
    let outcome = MergeEngine::with_merger(&mut fx.repo, never_called())
        .merge("master", "old")
        .unwrap();

    assert_eq!(outcome, MergeOutcome::UpToDate);
    assert_eq!(digest_dir(&shadow), before);
    assert!(!fx.root().join(".uvs/temp/ongoing_merge.json").exists());
}

#[test]
fn branches_at_the_same_snapshot_are_up_to_date() {
    let mut fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.commit("base");
    fx.repo.create_branch("twin", false).unwrap();
    let outcome = MergeEngine::new(&mut fx.repo).merge("master", "twin").unwrap();
    assert_eq!(outcome, MergeOutcome::UpToDate);
}

#[test]
fn behind_branch_fast_forwards_and_updates_working_dir() {
    let mut fx = Fixture::new();
    fx.write("a.txt", "a");
    let base = fx.commit("base");
    fx.repo.create_branch("feature", true).unwrap();
    fx.write("b.txt", "b");
    let tip = fx.commit("feature tip");
    fx.repo.checkout("master", true).unwrap();
    assert!(!fx.exists("b.txt"));

    let snapshots = fx.repo.store().get_snapshot_count().unwrap();
    let outcome = MergeEngine::new(&mut fx.repo).merge("master", "feature").unwrap();

    assert_eq!(
        outcome,
        MergeOutcome::FastForward {
            from: base,
            to: tip.clone()
        }
    );
    assert_eq!(fx.repo.store().get_snapshot_count().unwrap(), snapshots);
    assert_eq!(fx.repo.branches().unwrap()["master"], tip);
    assert_eq!(fx.read("b.txt"), "b");
    assert!(!fx.repo.status().unwrap().dirty);
}

#[test]
fn fast_forward_of_other_branch_leaves_working_dir_alone() {
    let mut fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.commit("base");
    fx.repo.create_branch("feature", true).unwrap();
    fx.write("b.txt", "b");
    let tip = fx.commit("feature tip");

    fx.write("scratch.txt", "uncommitted");
    let outcome = MergeEngine::new(&mut fx.repo).merge("master", "feature").unwrap();

    assert!(matches!(outcome, MergeOutcome::FastForward { .. }));
    assert_eq!(fx.repo.branches().unwrap()["master"], tip);
    assert_eq!(fx.read("scratch.txt"), "uncommitted");
}

#[test]
fn disjoint_changes_merge_cleanly_and_finalize() {
    let mut fx = diverged();
    let master_tip = fx.repo.branches().unwrap()["master"].clone();
    let feature_tip = fx.repo.branches().unwrap()["feature"].clone();

    let merger = never_called();
    let report = expect_merged(
        MergeEngine::with_merger(&mut fx.repo, merger)
            .merge("master", "feature")
            .unwrap(),
    );
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        list_files(&report.result_dir),
        vec!["feature_only.txt", "master_only.txt", "notes.txt", "shared.txt"]
    );
    assert_eq!(
        std::fs::read_to_string(report.result_dir.join("notes.txt")).unwrap(),
        "feature notes\n"
    );
    // Preparing leaves the working directory and branches alone
    assert!(!fx.exists("feature_only.txt"));
    assert_eq!(fx.repo.branches().unwrap()["master"], master_tip);
    assert!(fx.repo.status().unwrap().merge_pending);

    let merged = MergeEngine::new(&mut fx.repo)
        .finalize_merge("merge feature", &common::author())
        .unwrap();

    let record = fx.repo.get_snapshot(&merged).unwrap();
    assert_eq!(record.parents, vec![master_tip, feature_tip.clone()]);
    assert_eq!(fx.repo.branches().unwrap()["master"], merged);
    assert_eq!(fx.repo.branches().unwrap()["feature"], feature_tip);
    assert_eq!(fx.read("feature_only.txt"), "from feature\n");
    assert_eq!(fx.read("master_only.txt"), "from master\n");
    assert!(!fx.repo.status().unwrap().dirty);
    assert!(!fx.repo.status().unwrap().merge_pending);
    assert!(!report.result_dir.exists());

    // Afterwards the feature branch is contained in master
    let again = MergeEngine::new(&mut fx.repo).merge("master", "feature").unwrap();
    assert_eq!(again, MergeOutcome::UpToDate);
}

#[test]
fn file_added_on_both_sides_is_a_hard_conflict() {
    let mut fx = Fixture::new();
    fx.write("base.txt", "base\n");
    fx.commit("base");
    fx.repo.create_branch("feature", true).unwrap();
    fx.write("new.txt", "feature version\n");
    fx.commit("feature adds");
    fx.repo.checkout("master", true).unwrap();
    fx.write("new.txt", "master version");
    fx.commit("master adds");

    let report = expect_merged(
        MergeEngine::with_merger(&mut fx.repo, never_called())
            .merge("master", "feature")
            .unwrap(),
    );
    assert!(report.hard_conflicts);
    assert!(!report.trouble);
    assert_eq!(report.conflicted_paths, vec![Path::new("new.txt").to_path_buf()]);
    assert_eq!(
        std::fs::read_to_string(report.result_dir.join("new.txt")).unwrap(),
        "<<<<<<< master\nmaster version\n||||||| no common ancestor\n=======\nfeature version\n>>>>>>> feature\n"
    );
}

#[test]
fn edits_on_both_sides_go_through_the_file_merger() {
    let mut fx = Fixture::new();
    fx.write("doc.txt", "base\n");
    fx.commit("base");
    fx.repo.create_branch("feature", true).unwrap();
    fx.write("doc.txt", "feature\n");
    fx.commit("feature edit");
    fx.repo.checkout("master", true).unwrap();
    fx.write("doc.txt", "master\n");
    fx.commit("master edit");

    let merger = Scripted::new(FileMergeStatus::Clean, "merged by tool\n");
    let mut engine = MergeEngine::with_merger(&mut fx.repo, merger);
    let report = expect_merged(engine.merge("master", "feature").unwrap());
    assert!(report.is_clean());
    assert_eq!(
        std::fs::read_to_string(report.result_dir.join("doc.txt")).unwrap(),
        "merged by tool\n"
    );
}

#[test]
fn merger_conflicts_and_failures_are_reported() {
    for (status, conflicted, troubled) in [
        (FileMergeStatus::Conflicted, true, false),
        (FileMergeStatus::Failed("boom".into()), false, true),
    ] {
        let mut fx = Fixture::new();
        fx.write("doc.txt", "base\n");
        fx.commit("base");
        fx.repo.create_branch("feature", true).unwrap();
        fx.write("doc.txt", "feature\n");
        fx.commit("feature edit");
        fx.repo.checkout("master", true).unwrap();
        fx.write("doc.txt", "master\n");
        fx.commit("master edit");

        let merger = Scripted::new(status, "<<<<<<< master\n");
        let report = expect_merged(
            MergeEngine::with_merger(&mut fx.repo, merger)
                .merge("master", "feature")
                .unwrap(),
        );
        assert_eq!(report.hard_conflicts, conflicted);
        assert_eq!(report.trouble, troubled);
    }
}

#[test]
fn only_one_merge_may_be_pending() {
    let mut fx = diverged();
    MergeEngine::with_merger(&mut fx.repo, never_called())
        .merge("master", "feature")
        .unwrap();

    let mut engine = MergeEngine::new(&mut fx.repo);
    assert!(engine.pending().unwrap().is_some());
    assert!(matches!(
        engine.merge("master", "feature"),
        Err(UvsError::MergeInProgress)
    ));

    engine.abort_merge().unwrap();
    assert!(engine.pending().unwrap().is_none());
    assert!(matches!(engine.abort_merge(), Err(UvsError::NoMergeInProgress)));
    assert!(matches!(
        engine.finalize_merge("nothing", &common::author()),
        Err(UvsError::NoMergeInProgress)
    ));
}

#[test]
fn dirty_working_directory_blocks_a_merge() {
    let mut fx = diverged();
    fx.write("master_only.txt", "uncommitted edit\n");
    let result = MergeEngine::new(&mut fx.repo).merge("master", "feature");
    assert!(matches!(result, Err(UvsError::DirtyWorkingDirectory)));
}

#[test]
fn three_way_merge_requires_current_branch_checked_out() {
    let mut fx = diverged();
    fx.repo.checkout("feature", true).unwrap();
    let result = MergeEngine::new(&mut fx.repo).merge("master", "feature");
    assert!(matches!(result, Err(UvsError::InvalidReference(_))));
}

#[test]
fn finalize_refuses_when_branch_moved() {
    let mut fx = diverged();
    MergeEngine::with_merger(&mut fx.repo, never_called())
        .merge("master", "feature")
        .unwrap();

    fx.write("extra.txt", "sneaked in\n");
    fx.commit("moved on");

    let result = MergeEngine::new(&mut fx.repo).finalize_merge("late", &common::author());
    assert!(matches!(result, Err(UvsError::InvalidReference(_))));
}

#[test]
fn missing_branch_is_invalid_reference() {
    let mut fx = Fixture::new();
    fx.write("a.txt", "a");
    fx.commit("a");
    let result = MergeEngine::new(&mut fx.repo).merge("master", "ghost");
    assert!(matches!(result, Err(UvsError::InvalidReference(_))));
}
