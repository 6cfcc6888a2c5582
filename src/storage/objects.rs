//! Content-addressed blob storage.
//!
//! Every blob lives in its own file under the object directory, named by
//! the SHA-1 digest of its exact bytes and fanned out by the first two hex
//! characters:
//!
//! ```text
//! objects/
//!   aa/f4c61ddcc5e8a2dabede0f3b482cd9aea9434d
//!   b1/946ac92492d2347c6235b4d2611184e5bd3a1f
//! ```
//!
//! Writes are idempotent: storing content that already exists is a no-op.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha1::{Digest as _, Sha1};
use tracing::debug;

use crate::platform::Filesystem;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Digest;

/// default read size used when hashing streams
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// hash an in-memory byte slice
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    finish(Sha1::new_with_prefix(bytes))
}

fn finish(hasher: Sha1) -> Digest {
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    Digest::from_bytes(out)
}

/// hash a stream in fixed-size chunks, so memory use does not depend on
/// the size of the input
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Digest> {
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(finish(hasher))
}

/// The content store.
#[derive(Clone)]
pub struct ObjectStore {
    fs: Arc<dyn Filesystem>,
    dir: PathBuf,
    chunk_size: usize,
}

impl ObjectStore {
    pub fn new(fs: Arc<dyn Filesystem>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// on-disk location of a blob
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        let (prefix, rest) = digest.fan_out();
        self.dir.join(prefix).join(rest)
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.fs.is_file(&self.object_path(digest))
    }

    /// store `bytes`, returning their digest
    pub fn put(&self, bytes: &[u8]) -> StorageResult<Digest> {
        let digest = hash_bytes(bytes);
        let path = self.object_path(&digest);
        if self.fs.is_file(&path) {
            debug!(%digest, "object already stored");
            return Ok(digest);
        }

        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent)?;
        }
        self.fs.write(&path, bytes)?;
        debug!(%digest, size = bytes.len(), "stored object");
        Ok(digest)
    }

    /// digest a file by streaming it
    pub fn hash_file(&self, path: &Path) -> StorageResult<Digest> {
        let reader = self.fs.open_read(path)?;
        Ok(hash_reader(reader, self.chunk_size)?)
    }

    /// store the contents of a file
    ///
    /// The file is first digested as a stream; it is only read into memory
    /// when the store does not already hold that content. The returned
    /// digest always describes the bytes that were actually stored.
    pub fn put_file(&self, path: &Path) -> StorageResult<Digest> {
        let streamed = self.hash_file(path)?;
        if self.contains(&streamed) {
            debug!(digest = %streamed, path = %path.display(), "object already stored");
            return Ok(streamed);
        }
        let bytes = self.fs.read(path)?;
        self.put(&bytes)
    }

    /// read a blob back
    pub fn get(&self, digest: &Digest) -> StorageResult<Vec<u8>> {
        let path = self.object_path(digest);
        if !self.fs.is_file(&path) {
            return Err(StorageError::ObjectNotFound(*digest));
        }
        match self.fs.read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(*digest))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// re-hash a stored blob and check it still matches its key
    pub fn verify(&self, digest: &Digest) -> StorageResult<()> {
        let path = self.object_path(digest);
        if !self.fs.is_file(&path) {
            return Err(StorageError::ObjectNotFound(*digest));
        }
        let actual = self.hash_file(&path)?;
        if actual != *digest {
            return Err(StorageError::corrupted(
                path.display().to_string(),
                format!("content hashes to {}", actual),
            ));
        }
        Ok(())
    }
}
