//! Repository configuration.

use std::path::{Path, PathBuf};

use crate::storage::DEFAULT_CHUNK_SIZE;

/// Where the metadata database lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// a database file inside the metadata directory
    #[default]
    OnDisk,
    /// a private in-memory database, gone when the repository is dropped
    InMemory,
}

/// Repository configuration options.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Working-tree root.
    pub root: PathBuf,
    /// Name of the metadata directory under the root.
    pub meta_dir: String,
    /// Database file name inside the metadata directory.
    pub db_file: String,
    /// Object directory name inside the metadata directory.
    pub object_dir: String,
    /// Read size used when digesting files.
    pub chunk_size: usize,
    pub backend: StoreBackend,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            meta_dir: ".sbac".into(),
            db_file: "sbac.db".into(),
            object_dir: "objects".into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            backend: StoreBackend::OnDisk,
        }
    }
}

impl RepoConfig {
    /// Create a new configuration for the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn meta_dir(mut self, name: impl Into<String>) -> Self {
        self.meta_dir = name.into();
        self
    }

    pub fn db_file(mut self, name: impl Into<String>) -> Self {
        self.db_file = name.into();
        self
    }

    pub fn object_dir(mut self, name: impl Into<String>) -> Self {
        self.object_dir = name.into();
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/.sbac`
    pub fn meta_path(&self) -> PathBuf {
        self.root.join(&self.meta_dir)
    }

    /// `<root>/.sbac/sbac.db`
    pub fn db_path(&self) -> PathBuf {
        self.meta_path().join(&self.db_file)
    }

    /// `<root>/.sbac/objects`
    pub fn objects_path(&self) -> PathBuf {
        self.meta_path().join(&self.object_dir)
    }
}
