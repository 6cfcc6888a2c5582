//! Filesystem capability.
//!
//! The repository controller and the object store never touch `std::fs`
//! directly; they go through [`Filesystem`] so tests can swap in
//! [`MemoryFilesystem`].

use std::collections::BTreeMap;
use std::ops::Bound;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::RwLock;
use walkdir::WalkDir;

/// File operations needed by the repository.
pub trait Filesystem: Send + Sync {
    /// true if a file or directory exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// true if `path` is a regular file
    fn is_file(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// open a file for streaming reads
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// read a whole file into memory
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut reader = self.open_read(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// replace the contents of `path`; the parent directory must exist
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// last-modified time of a file
    fn modified(&self, path: &Path) -> io::Result<DateTime<Utc>>;

    /// absolute form of `path` with `.`, `..` and links resolved;
    /// fails if nothing exists there
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// every regular file below `root`, as paths relative to `root`,
    /// skipping the subtree rooted at `exclude`
    fn walk_files(&self, root: &Path, exclude: &Path) -> io::Result<Vec<PathBuf>>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

/// mode of files created by [`OsFilesystem::write`]
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

/// permissions a rewrite of `path` should carry; `None` keeps the
/// temporary file's own
fn permissions_for(path: &Path) -> io::Result<Option<fs::Permissions>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.permissions())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                Ok(Some(fs::Permissions::from_mode(NEW_FILE_MODE)))
            }
            #[cfg(not(unix))]
            {
                Ok(None)
            }
        }
        Err(e) => Err(e),
    }
}

impl Filesystem for OsFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::BufReader::new(fs::File::open(path)?)))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    /// writes go to a temporary file in the same directory and are renamed
    /// into place, so readers never observe a partially written file.
    /// An existing file keeps its permissions; new files get mode 0644.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let permissions = permissions_for(path)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(contents)?;
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn walk_files(&self, root: &Path, exclude: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(exclude))
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
        out.sort();
        Ok(out)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Vec<u8>, modified: DateTime<Utc> },
}

/// An in-memory filesystem for deterministic tests.
///
/// Modification times come from an internal tick that advances one second
/// per write.
#[derive(Debug)]
pub struct MemoryFilesystem {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
    tick: RwLock<DateTime<Utc>>,
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        let epoch = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);
        Self {
            nodes: RwLock::new(nodes),
            tick: RwLock::new(epoch),
        }
    }

    fn next_tick(&self) -> DateTime<Utc> {
        let mut tick = self.tick.write();
        *tick += Duration::seconds(1);
        *tick
    }

    /// remove a file; used by tests to simulate deletions
    pub fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            _ => Err(not_found(path)),
        }
    }

    /// remove an empty directory
    pub fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(not_found(path));
        }
        let occupied = nodes
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .next()
            .is_some_and(|(child, _)| child.starts_with(path));
        if occupied {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("directory not empty: {}", path.display()),
            ));
        }
        nodes.remove(path);
        Ok(())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

impl Filesystem for MemoryFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.nodes.read().get(path), Some(Node::File { .. }))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        for ancestor in path.ancestors() {
            match nodes.get(ancestor) {
                Some(Node::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("not a directory: {}", ancestor.display()),
                    ))
                }
                Some(Node::Dir) => {}
                None => {
                    nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        match self.nodes.read().get(path) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            _ => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let modified = self.next_tick();
        let mut nodes = self.nodes.write();
        let parent = path.parent().ok_or_else(|| not_found(path))?;
        if !matches!(nodes.get(parent), Some(Node::Dir)) {
            return Err(not_found(parent));
        }
        if matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("is a directory: {}", path.display()),
            ));
        }
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: contents.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        match self.nodes.read().get(path) {
            Some(Node::File { modified, .. }) => Ok(*modified),
            _ => Err(not_found(path)),
        }
    }

    /// paths are stored normalized, so only `.` and `..` need resolving
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => resolved.push(other.as_os_str()),
            }
        }
        if self.exists(&resolved) {
            Ok(resolved)
        } else {
            Err(not_found(path))
        }
    }

    fn walk_files(&self, root: &Path, exclude: &Path) -> io::Result<Vec<PathBuf>> {
        let nodes = self.nodes.read();
        let files = nodes
            .iter()
            .filter(|(path, node)| {
                matches!(node, Node::File { .. })
                    && path.starts_with(root)
                    && !path.starts_with(exclude)
            })
            .filter_map(|(path, _)| path.strip_prefix(root).ok().map(Path::to_path_buf))
            .collect();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_os_write_and_read() {
        let dir = TempDir::new().unwrap();
        let fs = OsFilesystem;
        let path = dir.path().join("file.txt");

        fs.write(&path, b"first").unwrap();
        fs.write(&path, b"second").unwrap();

        assert!(fs.is_file(&path));
        assert_eq!(fs.read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_os_walk_skips_excluded() {
        let dir = TempDir::new().unwrap();
        let fs = OsFilesystem;
        fs.create_dir_all(&dir.path().join("src/nested")).unwrap();
        fs.create_dir_all(&dir.path().join(".meta/objects")).unwrap();
        fs.write(&dir.path().join("a.txt"), b"a").unwrap();
        fs.write(&dir.path().join("src/nested/b.txt"), b"b").unwrap();
        fs.write(&dir.path().join(".meta/objects/x"), b"x").unwrap();

        let files = fs.walk_files(dir.path(), &dir.path().join(".meta")).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("a.txt"), PathBuf::from("src/nested/b.txt")]
        );
    }

    #[test]
    fn test_os_walk_skips_symlinked_dirs() {
        let dir = TempDir::new().unwrap();
        let fs = OsFilesystem;
        fs.create_dir_all(&dir.path().join("real")).unwrap();
        fs.write(&dir.path().join("real/a.txt"), b"a").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let files = fs.walk_files(dir.path(), &dir.path().join(".meta")).unwrap();
        assert_eq!(files, vec![PathBuf::from("real/a.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_os_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fs = OsFilesystem;
        let script = dir.path().join("run.sh");
        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;

        fs.write(&script, b"#!/bin/sh\n").unwrap();
        assert_eq!(mode(&script), NEW_FILE_MODE);

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        fs.write(&script, b"#!/bin/sh\necho hi\n").unwrap();
        assert_eq!(mode(&script), 0o755);
        assert_eq!(fs.read(&script).unwrap(), b"#!/bin/sh\necho hi\n");
    }

    #[test]
    fn test_canonicalize_resolves_dots() {
        let dir = TempDir::new().unwrap();
        let os = OsFilesystem;
        os.create_dir_all(&dir.path().join("sub")).unwrap();
        let dotted = dir.path().join("sub/../.");
        assert_eq!(
            os.canonicalize(&dotted).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );

        let mem = MemoryFilesystem::new();
        mem.create_dir_all(Path::new("/repo/sub")).unwrap();
        assert_eq!(
            mem.canonicalize(Path::new("/repo/sub/../.")).unwrap(),
            PathBuf::from("/repo")
        );
        assert!(mem.canonicalize(Path::new("/repo/missing")).is_err());
    }

    #[test]
    fn test_memory_requires_parent() {
        let fs = MemoryFilesystem::new();
        assert!(fs.write(Path::new("/repo/a.txt"), b"a").is_err());

        fs.create_dir_all(Path::new("/repo")).unwrap();
        fs.write(Path::new("/repo/a.txt"), b"a").unwrap();
        assert_eq!(fs.read(Path::new("/repo/a.txt")).unwrap(), b"a");
    }

    #[test]
    fn test_memory_modified_advances() {
        let fs = MemoryFilesystem::new();
        fs.create_dir_all(Path::new("/repo")).unwrap();
        let path = Path::new("/repo/a.txt");

        fs.write(path, b"one").unwrap();
        let first = fs.modified(path).unwrap();
        fs.write(path, b"two").unwrap();
        assert!(fs.modified(path).unwrap() > first);
    }

    #[test]
    fn test_memory_walk_and_remove() {
        let fs = MemoryFilesystem::new();
        fs.create_dir_all(Path::new("/repo/src")).unwrap();
        fs.create_dir_all(Path::new("/repo/.meta")).unwrap();
        fs.write(Path::new("/repo/src/lib.rs"), b"").unwrap();
        fs.write(Path::new("/repo/.meta/db"), b"").unwrap();
        fs.write(Path::new("/repo/top.txt"), b"").unwrap();

        let files = fs
            .walk_files(Path::new("/repo"), Path::new("/repo/.meta"))
            .unwrap();
        assert_eq!(files, vec![PathBuf::from("src/lib.rs"), PathBuf::from("top.txt")]);

        fs.remove_file(Path::new("/repo/top.txt")).unwrap();
        assert!(!fs.exists(Path::new("/repo/top.txt")));
        assert!(fs.remove_file(Path::new("/repo/src")).is_err());

        assert!(fs.remove_dir(Path::new("/repo/src")).is_err());
        fs.remove_file(Path::new("/repo/src/lib.rs")).unwrap();
        fs.remove_dir(Path::new("/repo/src")).unwrap();
        assert!(!fs.exists(Path::new("/repo/src")));
    }
}
