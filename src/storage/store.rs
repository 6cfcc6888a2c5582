//! The metadata database handle.
//!
//! Wraps a single SQLite connection behind a mutex and hands it out through
//! closures, so every caller sees either a plain connection or one open
//! transaction that commits only if the closure succeeds.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema;

/// Handle to the relational metadata store.
pub struct MetadataStore {
    conn: Mutex<Connection>,
    location: Option<PathBuf>,
}

impl MetadataStore {
    /// open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        debug!(path = %path.display(), "opened metadata store");
        Ok(Self {
            conn: Mutex::new(conn),
            location: Some(path.to_path_buf()),
        })
    }

    /// open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: None,
        })
    }

    fn configure(conn: &Connection) -> StorageResult<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// database file, or `None` for an in-memory store
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// create the schema if it is missing and check the stored version
    pub fn ensure_schema(&self) -> StorageResult<u32> {
        self.with_conn(|conn| {
            schema::create(conn)?;
            schema::check_version(conn)
        })
    }

    /// Execute a function with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside one transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err`.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StorageError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }
}
