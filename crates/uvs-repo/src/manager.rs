//! `Repository`: the encrypted working-directory manager.
//!
//! Owns the object store and the repository keys. All user-visible
//! operations (init, open, snapshot, checkout, branches, history) go
//! through here; the merge engine borrows it.

use secrecy::SecretString;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use uvs_core::layout::HEAD_REF;
use uvs_core::{
    IoResultExt, ObjectId, ObjectKind, RepoLayout, RepositoryConfig, SnapshotId, UvsConfig,
    UvsError, UvsResult,
};
use uvs_crypto::{generate_salt, CryptoContext};
use uvs_store::{DiscardStore, ObjectStore, StoreBackend};

use crate::checkout::{prepare_destination, Materializer};
use crate::dag::Dag;
use crate::objects::ObjectReader;
use crate::public::PublicDocument;
use crate::records::{decode, encode, unix_now, Author, SnapshotRecord};
use crate::refs::{Head, ReferenceDocument};
use crate::walk::{TreeBuilder, WalkFilter};

/// What the working directory looks like relative to the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    pub head: Head,
    pub head_snapshot: Option<SnapshotId>,
    pub root_tree_id: ObjectId,
    /// True when the working directory differs from the head snapshot
    pub dirty: bool,
    pub merge_pending: bool,
}

/// How a reference string was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolved {
    Snapshot(SnapshotId),
    Head(SnapshotId),
    Branch(String, SnapshotId),
}

impl Resolved {
    pub fn snapshot(&self) -> &SnapshotId {
        match self {
            Resolved::Snapshot(id) | Resolved::Head(id) | Resolved::Branch(_, id) => id,
        }
    }
}

pub struct Repository {
    layout: RepoLayout,
    config: RepositoryConfig,
    crypto: CryptoContext,
    store: Box<dyn ObjectStore>,
    filter: WalkFilter,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.layout.root())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Repository {
    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Create a repository in `root` with the backend named in `settings`,
    /// and write the effective settings to `.uvs/config.toml`.
    pub fn init(root: &Path, password: &SecretString, settings: &UvsConfig) -> UvsResult<Self> {
        let layout = RepoLayout::new(root);
        if layout.internal_dir().exists() {
            return Err(UvsError::InvalidRepository(format!(
                "{} already exists",
                layout.internal_dir().display()
            )));
        }
        std::fs::create_dir_all(layout.internal_dir()).at_path(&layout.internal_dir())?;
        std::fs::write(layout.config_path(), settings.to_toml()?).at_path(&layout.config_path())?;

        let store = StoreBackend::open(&settings.store, &layout)?;
        Self::init_with_store(
            root,
            Box::new(store),
            password,
            RepositoryConfig::from_settings(settings),
            settings,
        )
    }

    /// Create a repository on an already opened store.
    pub fn init_with_store(
        root: &Path,
        mut store: Box<dyn ObjectStore>,
        password: &SecretString,
        config: RepositoryConfig,
        settings: &UvsConfig,
    ) -> UvsResult<Self> {
        if store.get_public_document()?.is_some() {
            return Err(UvsError::InvalidRepository(
                "repository already initialized".into(),
            ));
        }

        let salt = generate_salt();
        let crypto = CryptoContext::derive(password, &salt, &config)?;

        let public = encode(&PublicDocument::new(&salt, config.clone()))?;
        let tag = crypto.mac(&public);
        store.set_public_document(&public, &tag)?;

        let mut repo = Self::assemble(root, config, crypto, store, settings);
        repo.save_refs(&ReferenceDocument::new(&settings.repository.default_branch))?;

        info!(
            root = %root.display(),
            branch = %settings.repository.default_branch,
            "repository initialized"
        );
        Ok(repo)
    }

    /// Open the repository in `root` using the backend named in `settings`.
    pub fn open(root: &Path, password: &SecretString, settings: &UvsConfig) -> UvsResult<Self> {
        let layout = RepoLayout::new(root);
        if !layout.internal_dir().is_dir() {
            return Err(UvsError::InvalidRepository(format!(
                "no repository at {}",
                root.display()
            )));
        }
        let store = StoreBackend::open(&settings.store, &layout)?;
        Self::open_with_store(root, Box::new(store), password, settings)
    }

    /// Open a repository whose records live in `store`.
    ///
    /// A wrong password is reported as `TamperDetected`, exactly like a
    /// modified public document.
    pub fn open_with_store(
        root: &Path,
        store: Box<dyn ObjectStore>,
        password: &SecretString,
        settings: &UvsConfig,
    ) -> UvsResult<Self> {
        let (public_bytes, tag) = store
            .get_public_document()?
            .ok_or_else(|| UvsError::InvalidRepository("missing public document".into()))?;
        let public: PublicDocument = decode(&public_bytes)?;
        let salt = public.salt_bytes()?;

        let crypto = CryptoContext::derive(password, &salt, &public.config)?;
        if !crypto.verify_mac(&public_bytes, &tag) {
            warn!(root = %root.display(), "public document failed verification");
            return Err(UvsError::TamperDetected);
        }

        let repo = Self::assemble(root, public.config, crypto, store, settings);
        repo.load_refs()?;
        debug!(root = %root.display(), "repository opened");
        Ok(repo)
    }

    fn assemble(
        root: &Path,
        config: RepositoryConfig,
        crypto: CryptoContext,
        store: Box<dyn ObjectStore>,
        settings: &UvsConfig,
    ) -> Self {
        Self {
            layout: RepoLayout::new(root),
            filter: WalkFilter::new(root, &settings.repository.exclude_patterns),
            config,
            crypto,
            store,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    /// Parameters fixed at `init`.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub(crate) fn reader(&self) -> ObjectReader<'_> {
        ObjectReader::new(&self.crypto, self.store.as_ref())
    }

    // ── References ───────────────────────────────────────────────────────────

    pub(crate) fn load_refs(&self) -> UvsResult<ReferenceDocument> {
        let ciphertext = self
            .store
            .get_reference_document()?
            .ok_or_else(|| UvsError::InvalidRepository("missing reference document".into()))?;
        decode(&self.crypto.decrypt(&ciphertext)?)
    }

    pub(crate) fn save_refs(&mut self, refs: &ReferenceDocument) -> UvsResult<()> {
        let ciphertext = self.crypto.encrypt(&encode(refs)?)?;
        self.store.update_reference_document(&ciphertext)
    }

    pub fn head(&self) -> UvsResult<Head> {
        Ok(self.load_refs()?.head)
    }

    pub fn head_snapshot(&self) -> UvsResult<Option<SnapshotId>> {
        Ok(self.load_refs()?.head_snapshot().cloned())
    }

    /// Every branch that points at a snapshot.
    pub fn branches(&self) -> UvsResult<BTreeMap<String, SnapshotId>> {
        Ok(self.load_refs()?.branches)
    }

    /// Snapshot id `reference` denotes, without moving the head.
    pub fn resolve(&self, reference: &str) -> UvsResult<SnapshotId> {
        let refs = self.load_refs()?;
        Ok(self.resolve_in(&refs, reference)?.snapshot().clone())
    }

    /// Resolution order: a stored snapshot id, then `head`, then a branch.
    pub(crate) fn resolve_in(
        &self,
        refs: &ReferenceDocument,
        reference: &str,
    ) -> UvsResult<Resolved> {
        if ObjectId::is_well_formed(reference) {
            let id = ObjectId::parse(reference)?;
            if self.store.contains(ObjectKind::Snapshot, &id)? {
                return Ok(Resolved::Snapshot(id));
            }
        }
        if reference == HEAD_REF {
            return refs
                .head_snapshot()
                .map(|id| Resolved::Head(id.clone()))
                .ok_or_else(|| UvsError::InvalidReference("head has no snapshot yet".into()));
        }
        match refs.branches.get(reference) {
            Some(id) => Ok(Resolved::Branch(reference.to_string(), id.clone())),
            None => Err(UvsError::InvalidReference(format!(
                "'{reference}' is neither a snapshot nor a branch with snapshots"
            ))),
        }
    }

    /// Create a branch at the head snapshot, optionally switching to it.
    ///
    /// The working directory is untouched: the new branch starts at the
    /// snapshot the head already denotes.
    pub fn create_branch(&mut self, name: &str, make_current: bool) -> UvsResult<()> {
        let mut refs = self.load_refs()?;
        self.check_branch_name(&refs, name)?;
        let target = refs.head_snapshot().cloned().ok_or_else(|| {
            UvsError::InvalidReference("cannot create a branch before the first snapshot".into())
        })?;

        refs.branches.insert(name.to_string(), target.clone());
        if make_current {
            refs.head = Head::Attached {
                branch: name.to_string(),
            };
        }
        self.save_refs(&refs)?;
        info!(branch = %name, at = %target.short(), current = make_current, "branch created");
        Ok(())
    }

    fn check_branch_name(&self, refs: &ReferenceDocument, name: &str) -> UvsResult<()> {
        let bad = |why: &str| Err(UvsError::InvalidBranchName(format!("'{name}': {why}")));
        if name.is_empty() {
            return bad("empty");
        }
        if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return bad("contains whitespace or a path separator");
        }
        if name.eq_ignore_ascii_case(HEAD_REF) {
            return bad("reserved");
        }
        if refs.branches.contains_key(name) {
            return bad("already exists");
        }
        if ObjectId::is_well_formed(name)
            && self
                .store
                .contains(ObjectKind::Snapshot, &ObjectId::parse(name)?)?
        {
            return bad("collides with a snapshot id");
        }
        Ok(())
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    /// Record the working directory as a new snapshot at the head.
    pub fn take_snapshot(&mut self, message: &str, author: &Author) -> UvsResult<SnapshotId> {
        let refs = self.load_refs()?;
        let parents = match refs.head_snapshot() {
            Some(id) => vec![id.clone()],
            None if self.store.get_snapshot_count()? == 0 => Vec::new(),
            None => {
                return Err(UvsError::InvalidRepository(
                    "head is unborn but snapshots exist".into(),
                ))
            }
        };
        self.snapshot_with_parents(refs, message, author, parents)
    }

    /// Walk the working directory, store a snapshot with `parents`, then
    /// advance the head. The snapshot is stored before the references move.
    pub(crate) fn snapshot_with_parents(
        &mut self,
        mut refs: ReferenceDocument,
        message: &str,
        author: &Author,
        parents: Vec<SnapshotId>,
    ) -> UvsResult<SnapshotId> {
        let (root_tree_id, stats) = {
            let mut builder = TreeBuilder::new(
                &self.crypto,
                self.store.as_mut(),
                &self.filter,
                self.config.segments,
            );
            let id = builder.build(self.layout.root())?;
            (id, builder.stats)
        };

        let mut id = self.crypto.random_snapshot_id();
        while self.store.contains(ObjectKind::Snapshot, &id)? {
            id = self.crypto.random_snapshot_id();
        }
        let record = SnapshotRecord {
            verify_id: id.clone(),
            root_tree_id,
            message: message.to_string(),
            author: author.clone(),
            parents,
            created_at: unix_now(),
        };
        let ciphertext = self.crypto.encrypt(&encode(&record)?)?;
        self.store.add_snapshot(&id, &ciphertext)?;

        refs.advance_head(id.clone());
        self.save_refs(&refs)?;

        info!(
            snapshot = %id.short(),
            tree = %record.root_tree_id.short(),
            parents = record.parents.len(),
            files = stats.files,
            bytes = stats.bytes,
            "snapshot taken"
        );
        Ok(id)
    }

    pub fn get_snapshot(&self, id: &SnapshotId) -> UvsResult<SnapshotRecord> {
        self.reader().snapshot(id)
    }

    /// Tree id of `path` as a snapshot would record it. Nothing is stored.
    pub fn compute_tree_id(&self, path: &Path) -> UvsResult<ObjectId> {
        let mut discard = DiscardStore;
        let mut builder =
            TreeBuilder::new(&self.crypto, &mut discard, &self.filter, self.config.segments);
        builder.build(path)
    }

    pub fn compute_root_tree_id(&self) -> UvsResult<ObjectId> {
        self.compute_tree_id(self.layout.root())
    }

    pub fn status(&self) -> UvsResult<RepoStatus> {
        let refs = self.load_refs()?;
        let head_snapshot = refs.head_snapshot().cloned();
        let root_tree_id = self.compute_root_tree_id()?;
        let dirty = match &head_snapshot {
            Some(id) => self.reader().snapshot(id)?.root_tree_id != root_tree_id,
            // No snapshot yet: always dirty
            None => true,
        };
        Ok(RepoStatus {
            head: refs.head,
            head_snapshot,
            root_tree_id,
            dirty,
            merge_pending: self.layout.pending_merge_path().exists(),
        })
    }

    // ── Checkout ─────────────────────────────────────────────────────────────

    /// Replace the working directory with the snapshot `reference` denotes
    /// and move the head there.
    ///
    /// A snapshot id detaches the head, a branch name attaches it, and
    /// `head` leaves it where it is. With `clear_destination` false the
    /// snapshot is written over the existing content.
    pub fn checkout(&mut self, reference: &str, clear_destination: bool) -> UvsResult<SnapshotId> {
        let mut refs = self.load_refs()?;
        let resolved = self.resolve_in(&refs, reference)?;
        let id = resolved.snapshot().clone();

        let root = self.layout.root().to_path_buf();
        self.checkout_into(&id, &root, clear_destination)?;

        match resolved {
            Resolved::Snapshot(id) => refs.head = Head::Detached { snapshot: id },
            Resolved::Branch(branch, _) => refs.head = Head::Attached { branch },
            Resolved::Head(_) => {}
        }
        self.save_refs(&refs)?;
        info!(reference = %reference, snapshot = %id.short(), head = %refs.head, "checked out");
        Ok(id)
    }

    /// Materialize a snapshot into `dest` without touching references.
    ///
    /// When `dest` is the working directory, `.uvs` is always preserved.
    pub fn checkout_into(
        &self,
        id: &SnapshotId,
        dest: &Path,
        clear_destination: bool,
    ) -> UvsResult<usize> {
        let reader = self.reader();
        let snapshot = reader.snapshot(id)?;
        prepare_destination(dest, clear_destination)?;

        let mut materializer = Materializer::new(reader);
        materializer.write_tree(&snapshot.root_tree_id, dest)?;
        debug!(
            snapshot = %id.short(),
            dest = %dest.display(),
            files = materializer.files_written,
            "snapshot materialized"
        );
        Ok(materializer.files_written)
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Snapshots reachable from `reference`, newest first: breadth-first
    /// over parents, each snapshot once.
    pub fn log(&self, reference: &str) -> UvsResult<Vec<(SnapshotId, SnapshotRecord)>> {
        let start = self.resolve(reference)?;
        let reader = self.reader();

        let mut out = Vec::new();
        let mut seen = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let record = reader.snapshot(&id)?;
            for parent in &record.parents {
                if seen.insert(parent.clone()) {
                    queue.push_back(parent.clone());
                }
            }
            out.push((id, record));
        }
        Ok(out)
    }

    /// The whole snapshot history, edges pointing to parents.
    pub fn history_dag(&self) -> UvsResult<Dag<SnapshotId>> {
        let mut dag = Dag::new();
        for (id, record) in self.reader().all_snapshots()? {
            dag.add(id, record.parents);
        }
        Ok(dag)
    }

    /// Snapshots no pointer reaches and no other snapshot names as parent.
    ///
    /// A crash between storing a snapshot and updating the references
    /// leaves exactly such a snapshot behind.
    pub fn dangling_snapshots(&self) -> UvsResult<Vec<SnapshotId>> {
        let refs = self.load_refs()?;
        let mut reached: BTreeSet<SnapshotId> = refs.referenced().cloned().collect();
        let all = self.reader().all_snapshots()?;
        for (_, record) in &all {
            reached.extend(record.parents.iter().cloned());
        }
        Ok(all
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !reached.contains(id))
            .collect())
    }

    pub(crate) fn internal_temp_dir(&self) -> UvsResult<PathBuf> {
        let dir = self.layout.temp_dir();
        std::fs::create_dir_all(&dir).at_path(&dir)?;
        Ok(dir)
    }
}
