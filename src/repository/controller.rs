//! The repository handle: every user-facing operation lives here.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::diff::{diff_text, LineDiff, SimilarDiff};
use crate::platform::{Clock, Filesystem, OsFilesystem, SystemClock};
use crate::repository::config::{RepoConfig, StoreBackend};
use crate::repository::error::{RepoError, RepoResult};
use crate::repository::report::{CheckoutReport, FileDiff, StatusReport};
use crate::storage::schema::{self, KEY_CREATED_AT, KEY_SCHEMA_VERSION, SCHEMA_VERSION};
use crate::storage::{
    hash_bytes, Baseline, BaselineName, Commit, CommitEntry, CommitId, Digest, HistoryStore,
    MetadataStore, ObjectStore, ReferenceStore, RepoPath, TrackedFile, TrackingTable,
};

/// shortest hex prefix accepted when resolving a commit id
pub const MIN_PREFIX_LEN: usize = 4;

/// A working tree plus its metadata directory.
pub struct Repository {
    config: RepoConfig,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    differ: Box<dyn LineDiff + Send + Sync>,
    objects: ObjectStore,
    store: Option<MetadataStore>,
}

impl Repository {
    /// Open the repository at `root` on the real filesystem.
    pub fn open(root: impl Into<PathBuf>) -> RepoResult<Self> {
        Self::open_with_config(RepoConfig::new(root))
    }

    /// Open with custom configuration on the real filesystem.
    pub fn open_with_config(config: RepoConfig) -> RepoResult<Self> {
        Self::with_capabilities(config, Arc::new(OsFilesystem), Arc::new(SystemClock))
    }

    /// Open with injected filesystem and clock.
    ///
    /// An uninitialized root is not an error here; operations other than
    /// [`Repository::init`] fail with [`RepoError::NotInitialized`].
    pub fn with_capabilities(
        config: RepoConfig,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
    ) -> RepoResult<Self> {
        let objects =
            ObjectStore::new(fs.clone(), config.objects_path()).with_chunk_size(config.chunk_size);
        let mut repo = Self {
            config,
            fs,
            clock,
            differ: Box::new(SimilarDiff::new()),
            objects,
            store: None,
        };

        if repo.fs.exists(&repo.config.meta_path()) {
            let store = repo.open_store()?;
            let version = store.ensure_schema()?;
            debug!(root = %repo.config.root.display(), version, "opened repository");
            repo.store = Some(store);
        }
        Ok(repo)
    }

    /// replace the line differ used by [`Repository::diff`]
    pub fn with_differ(mut self, differ: impl LineDiff + Send + Sync + 'static) -> Self {
        self.differ = Box::new(differ);
        self
    }

    fn open_store(&self) -> RepoResult<MetadataStore> {
        let store = match self.config.backend {
            StoreBackend::OnDisk => MetadataStore::open(self.config.db_path())?,
            StoreBackend::InMemory => MetadataStore::open_in_memory()?,
        };
        Ok(store)
    }

    fn store(&self) -> RepoResult<&MetadataStore> {
        self.store
            .as_ref()
            .ok_or_else(|| RepoError::NotInitialized(self.config.meta_path()))
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.config.root()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Create the metadata directory, object store and database.
    pub fn init(&mut self) -> RepoResult<()> {
        let meta = self.config.meta_path();
        if self.fs.exists(&meta) {
            return Err(RepoError::AlreadyInitialized(meta));
        }

        self.fs.create_dir_all(&meta)?;
        self.fs.create_dir_all(&self.config.objects_path())?;

        let store = self.open_store()?;
        let created_at = self.clock.now();
        store.with_transaction(|conn| -> RepoResult<()> {
            schema::create(conn)?;
            schema::set_config(conn, KEY_CREATED_AT, &created_at.to_rfc3339())?;
            schema::set_config(conn, KEY_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
            Ok(())
        })?;
        self.store = Some(store);

        info!(path = %meta.display(), "initialized empty repository");
        Ok(())
    }

    /// when `init` ran, as recorded in the config relation
    pub fn created_at(&self) -> RepoResult<Option<DateTime<Utc>>> {
        let raw = self
            .store()?
            .with_conn(|conn| schema::get_config(conn, KEY_CREATED_AT))?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    /// turn user input into a repository path
    fn resolve_path(&self, input: &str) -> RepoResult<RepoPath> {
        let raw = Path::new(input);
        let relative = if raw.is_absolute() {
            self.strip_root(raw)
                .ok_or_else(|| RepoError::invalid_path(input, "outside the repository root"))?
        } else {
            raw.to_path_buf()
        };

        let path =
            RepoPath::from_relative(&relative).map_err(|e| RepoError::invalid_path(input, e))?;
        if path.first_component() == self.config.meta_dir {
            return Err(RepoError::invalid_path(input, "inside the metadata directory"));
        }
        Ok(path)
    }

    /// relative form of an absolute path under the root; a root like `.`
    /// only matches once both sides are canonical
    fn strip_root(&self, absolute: &Path) -> Option<PathBuf> {
        if let Ok(relative) = absolute.strip_prefix(self.root()) {
            return Some(relative.to_path_buf());
        }

        // the file itself may not exist yet, and may be a link pointing
        // elsewhere, so only its directory is resolved
        let root = self.fs.canonicalize(self.root()).ok()?;
        let dir = self.fs.canonicalize(absolute.parent()?).ok()?;
        let full = dir.join(absolute.file_name()?);
        full.strip_prefix(&root).ok().map(Path::to_path_buf)
    }

    /// Stage one file: store its content and mark it staged.
    pub fn add(&self, path: &str) -> RepoResult<TrackedFile> {
        let store = self.store()?;
        let path = self.resolve_path(path)?;
        let full = path.to_fs_path(self.root());
        if !self.fs.is_file(&full) {
            return Err(RepoError::FileNotFound(path.to_string()));
        }

        let last_hash = self.objects.put_file(&full)?;
        let last_modified = self.fs.modified(&full)?;
        store.with_conn(|conn| TrackingTable::upsert(conn, &path, &last_hash, last_modified, true))?;

        info!(%path, hash = %last_hash.short(), "staged file");
        Ok(TrackedFile {
            path,
            last_hash,
            last_modified,
            staged: true,
        })
    }

    /// Stage several files, stopping at the first failure.
    pub fn add_all<S: AsRef<str>>(&self, paths: &[S]) -> RepoResult<Vec<TrackedFile>> {
        paths.iter().map(|p| self.add(p.as_ref())).collect()
    }

    /// Compare the working tree against the tracking table.
    pub fn status(&self) -> RepoResult<StatusReport> {
        let store = self.store()?;
        let tracked = store.with_conn(TrackingTable::list)?;
        let mut report = StatusReport::default();

        for file in &tracked {
            if file.staged {
                report.staged.push(file.path.clone());
                continue;
            }
            let full = file.path.to_fs_path(self.root());
            if !self.fs.is_file(&full) {
                continue;
            }
            match self.objects.hash_file(&full) {
                Ok(digest) if digest != file.last_hash => report.modified.push(file.path.clone()),
                Ok(_) => {}
                Err(e) => warn!(path = %file.path, error = %e, "could not hash tracked file"),
            }
        }

        let known: BTreeSet<&RepoPath> = tracked.iter().map(|f| &f.path).collect();
        for relative in self.fs.walk_files(self.root(), &self.config.meta_path())? {
            match RepoPath::from_relative(&relative) {
                Ok(path) if !known.contains(&path) => report.untracked.push(path),
                Ok(_) => {}
                Err(e) => warn!(path = %relative.display(), error = %e, "skipping unrepresentable path"),
            }
        }

        report.staged.sort();
        report.modified.sort();
        report.untracked.sort();
        Ok(report)
    }

    /// Line diffs between stored and current content.
    ///
    /// With a path, that one tracked file is diffed even when unchanged.
    /// Without, every tracked file whose digest changed is diffed and files
    /// missing from disk are skipped.
    pub fn diff(&self, path: Option<&str>) -> RepoResult<Vec<FileDiff>> {
        let store = self.store()?;

        if let Some(input) = path {
            let path = self.resolve_path(input)?;
            let tracked = store
                .with_conn(|conn| TrackingTable::get(conn, &path))?
                .ok_or_else(|| RepoError::UntrackedFile(path.clone()))?;
            let full = path.to_fs_path(self.root());
            if !self.fs.is_file(&full) {
                return Err(RepoError::FileNotFound(path.to_string()));
            }
            let current = self.fs.read(&full)?;
            return Ok(vec![self.file_diff(&tracked, &current)?]);
        }

        let mut diffs = Vec::new();
        for tracked in store.with_conn(TrackingTable::list)? {
            let full = tracked.path.to_fs_path(self.root());
            if !self.fs.is_file(&full) {
                warn!(path = %tracked.path, "tracked file missing from disk, skipping");
                continue;
            }
            if self.objects.hash_file(&full)? == tracked.last_hash {
                continue;
            }
            let current = self.fs.read(&full)?;
            diffs.push(self.file_diff(&tracked, &current)?);
        }
        Ok(diffs)
    }

    fn file_diff(&self, tracked: &TrackedFile, current: &[u8]) -> RepoResult<FileDiff> {
        let stored = self.objects.get(&tracked.last_hash)?;
        let old = String::from_utf8_lossy(&stored);
        let new = String::from_utf8_lossy(current);
        let edits = diff_text(self.differ.as_ref(), &old, &new);
        Ok(FileDiff::new(
            tracked.path.clone(),
            tracked.last_hash,
            hash_bytes(current),
            edits,
        ))
    }

    /// Snapshot every staged file into a new commit.
    pub fn commit(&self, message: &str) -> RepoResult<Commit> {
        let store = self.store()?;
        let now = self.clock.now();

        let commit = store.with_transaction(|conn| -> RepoResult<Commit> {
            let staged = TrackingTable::list_staged(conn)?;
            if staged.is_empty() {
                return Err(RepoError::NothingStaged);
            }

            let mut entries = Vec::with_capacity(staged.len());
            for file in &staged {
                if !self.objects.contains(&file.last_hash) {
                    return Err(RepoError::ObjectNotFound(file.last_hash));
                }
                entries.push(CommitEntry::new(file.path.clone(), file.last_hash));
            }
            entries.sort();

            let parent = HistoryStore::head(conn)?.map(|c| c.id);
            let commit = HistoryStore::append_commit(conn, message, parent, now, &entries)?;
            HistoryStore::record_entries(conn, commit.id, &entries)?;

            let paths: Vec<RepoPath> = staged.into_iter().map(|f| f.path).collect();
            TrackingTable::clear_staged(conn, &paths)?;
            Ok(commit)
        })?;

        info!(id = %commit.id.short(), message = commit.summary(), "created commit");
        Ok(commit)
    }

    /// the latest commit, if any
    pub fn head(&self) -> RepoResult<Option<Commit>> {
        Ok(self.store()?.with_conn(HistoryStore::head)?)
    }

    /// Commits, newest first.
    pub fn history(&self, limit: Option<usize>) -> RepoResult<Vec<Commit>> {
        Ok(self
            .store()?
            .with_conn(|conn| HistoryStore::history(conn, limit))?)
    }

    /// the files recorded by a commit or baseline
    pub fn entries(&self, version: &str) -> RepoResult<Vec<CommitEntry>> {
        self.store()?.with_transaction(|conn| -> RepoResult<Vec<CommitEntry>> {
            let commit = resolve_version(conn, version)?;
            Ok(HistoryStore::entries_of(conn, commit.id)?)
        })
    }

    /// Point `name` at the current head, creating or moving it.
    pub fn baseline(&self, name: &str) -> RepoResult<Baseline> {
        let name = BaselineName::new(name)?;
        let baseline = self.store()?.with_transaction(|conn| -> RepoResult<Baseline> {
            let head = HistoryStore::head(conn)?.ok_or(RepoError::NoCommits)?;
            ReferenceStore::set(conn, &name, head.id)?;
            Ok(Baseline {
                name: name.clone(),
                commit_id: head.id,
                message: head.message,
            })
        })?;

        info!(name = %baseline.name, commit = %baseline.commit_id.short(), "baseline set");
        Ok(baseline)
    }

    /// Every baseline, ordered by name.
    pub fn list_baselines(&self) -> RepoResult<Vec<Baseline>> {
        Ok(self.store()?.with_conn(ReferenceStore::list)?)
    }

    /// Restore the files of a baseline or commit into the working tree.
    ///
    /// Files outside the snapshot are left alone. Every referenced blob and
    /// every target path is checked before anything is written, and the
    /// tracking rows of the restored files are refreshed in the same
    /// transaction.
    pub fn checkout(&self, version: &str) -> RepoResult<CheckoutReport> {
        let store = self.store()?;

        let report = store.with_transaction(|conn| -> RepoResult<CheckoutReport> {
            let commit = resolve_version(conn, version)?;
            let entries = HistoryStore::entries_of(conn, commit.id)?;
            if let Some(missing) = entries.iter().find(|e| !self.objects.contains(&e.hash)) {
                return Err(RepoError::ObjectNotFound(missing.hash));
            }
            for entry in &entries {
                self.check_restorable(&entry.path)?;
            }

            let mut restored = Vec::with_capacity(entries.len());
            for entry in entries {
                let bytes = self.objects.get(&entry.hash)?;
                let full = entry.path.to_fs_path(self.root());
                if let Some(parent) = full.parent() {
                    self.fs.create_dir_all(parent)?;
                }
                self.fs.write(&full, &bytes)?;
                let modified = self.fs.modified(&full)?;
                TrackingTable::upsert(conn, &entry.path, &entry.hash, modified, false)?;
                debug!(path = %entry.path, "restored file");
                restored.push(entry.path);
            }
            Ok(CheckoutReport { commit, restored })
        })?;

        info!(
            commit = %report.commit.id.short(),
            files = report.restored.len(),
            "checked out"
        );
        Ok(report)
    }

    /// a restore target must not be a directory, and nothing between the
    /// root and it may be a file
    fn check_restorable(&self, path: &RepoPath) -> RepoResult<()> {
        let blocked = |reason: String| RepoError::CheckoutBlocked {
            path: path.clone(),
            reason,
        };

        let full = path.to_fs_path(self.root());
        if self.fs.exists(&full) && !self.fs.is_file(&full) {
            return Err(blocked("a directory is in the way".to_string()));
        }
        for ancestor in full.ancestors().skip(1) {
            if ancestor == self.root() {
                break;
            }
            if self.fs.is_file(ancestor) {
                let name = ancestor.strip_prefix(self.root()).unwrap_or(ancestor);
                return Err(blocked(format!("{} is a file", name.display())));
            }
        }
        Ok(())
    }
}

/// Resolve a version string: baseline name, then full commit id, then a
/// unique id prefix of at least [`MIN_PREFIX_LEN`] hex digits.
fn resolve_version(conn: &Connection, version: &str) -> RepoResult<Commit> {
    let not_found = || RepoError::CommitNotFound(version.to_string());

    if let Some(id) = ReferenceStore::resolve(conn, version)? {
        return HistoryStore::get(conn, id)?.ok_or_else(not_found);
    }

    if let Ok(id) = CommitId::from_hex(version) {
        if let Some(commit) = HistoryStore::get(conn, id)? {
            return Ok(commit);
        }
    }

    let is_prefix = version.len() >= MIN_PREFIX_LEN
        && version.len() < Digest::HEX_LEN
        && version.chars().all(|c| c.is_ascii_hexdigit());
    if !is_prefix {
        return Err(not_found());
    }

    match HistoryStore::find_by_prefix(conn, version)?.as_slice() {
        [] => Err(not_found()),
        [id] => HistoryStore::get(conn, *id)?.ok_or_else(not_found),
        many => Err(RepoError::AmbiguousCommit {
            prefix: version.to_string(),
            count: many.len(),
        }),
    }
}
