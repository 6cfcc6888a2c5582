//! The tracking table: one row per repository path.
//!
//! Each row remembers the digest of the content last added (or restored),
//! the source modification time, and whether that content is staged for
//! the next commit. No filesystem checks happen here.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Digest, RepoPath};

/// A tracked path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedFile {
    pub path: RepoPath,
    pub last_hash: Digest,
    /// advisory only; change detection always compares digests
    pub last_modified: DateTime<Utc>,
    pub staged: bool,
}

/// Access to the `files` relation.
pub struct TrackingTable;

impl TrackingTable {
    /// create or replace the row for `path`
    pub fn upsert(
        conn: &Connection,
        path: &RepoPath,
        hash: &Digest,
        modified: DateTime<Utc>,
        staged: bool,
    ) -> StorageResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO files (path, last_hash, last_modified, staged)
             VALUES (?1, ?2, ?3, ?4)",
            (
                path.as_str(),
                hash.to_hex(),
                to_unix_seconds(modified),
                staged,
            ),
        )?;
        debug!(%path, %hash, staged, "tracking row updated");
        Ok(())
    }

    pub fn get(conn: &Connection, path: &RepoPath) -> StorageResult<Option<TrackedFile>> {
        let raw = conn
            .query_row(
                "SELECT path, last_hash, last_modified, staged FROM files WHERE path = ?1",
                [path.as_str()],
                RawTrackedFile::from_row,
            )
            .optional()?;
        raw.map(RawTrackedFile::decode).transpose()
    }

    /// every tracked path, ordered by path
    pub fn list(conn: &Connection) -> StorageResult<Vec<TrackedFile>> {
        Self::query(
            conn,
            "SELECT path, last_hash, last_modified, staged FROM files ORDER BY path",
        )
    }

    /// every path whose staged flag is set, ordered by path
    pub fn list_staged(conn: &Connection) -> StorageResult<Vec<TrackedFile>> {
        Self::query(
            conn,
            "SELECT path, last_hash, last_modified, staged FROM files
             WHERE staged = 1 ORDER BY path",
        )
    }

    /// unset the staged flag on the given paths, returning how many rows changed
    pub fn clear_staged(conn: &Connection, paths: &[RepoPath]) -> StorageResult<usize> {
        let mut stmt = conn.prepare("UPDATE files SET staged = 0 WHERE path = ?1 AND staged = 1")?;
        let mut cleared = 0;
        for path in paths {
            cleared += stmt.execute([path.as_str()])?;
        }
        Ok(cleared)
    }

    fn query(conn: &Connection, sql: &str) -> StorageResult<Vec<TrackedFile>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], RawTrackedFile::from_row)?;

        let mut files = Vec::new();
        for raw in rows {
            files.push(raw?.decode()?);
        }
        Ok(files)
    }
}

/// column values as stored, before validation
struct RawTrackedFile {
    path: String,
    last_hash: String,
    last_modified: f64,
    staged: bool,
}

impl RawTrackedFile {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            last_hash: row.get(1)?,
            last_modified: row.get(2)?,
            staged: row.get(3)?,
        })
    }

    fn decode(self) -> StorageResult<TrackedFile> {
        let key = format!("files/{}", self.path);
        let path = RepoPath::new(&self.path)
            .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
        let last_hash = Digest::from_hex(&self.last_hash)
            .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
        let last_modified = from_unix_seconds(self.last_modified).ok_or_else(|| {
            StorageError::corrupted(&key, format!("bad timestamp {}", self.last_modified))
        })?;

        Ok(TrackedFile {
            path,
            last_hash,
            last_modified,
            staged: self.staged,
        })
    }
}

/// modification times are persisted as fractional unix seconds
pub(crate) fn to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::objects::hash_bytes;
    use crate::storage::schema;
    use chrono::TimeZone;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create(&conn).unwrap();
        conn
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new(p).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = setup();
        let hash = hash_bytes(b"hello");
        TrackingTable::upsert(&conn, &path("a.txt"), &hash, at(1_700_000_000), true).unwrap();

        let row = TrackingTable::get(&conn, &path("a.txt")).unwrap().unwrap();
        assert_eq!(row.last_hash, hash);
        assert_eq!(row.last_modified, at(1_700_000_000));
        assert!(row.staged);

        assert!(TrackingTable::get(&conn, &path("missing.txt")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces() {
        let conn = setup();
        let p = path("a.txt");
        TrackingTable::upsert(&conn, &p, &hash_bytes(b"one"), at(1), true).unwrap();
        TrackingTable::upsert(&conn, &p, &hash_bytes(b"two"), at(2), false).unwrap();

        let rows = TrackingTable::list(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_hash, hash_bytes(b"two"));
        assert!(!rows[0].staged);
    }

    #[test]
    fn test_list_staged_and_clear() {
        let conn = setup();
        for (name, staged) in [("b.txt", true), ("a.txt", true), ("c.txt", false)] {
            TrackingTable::upsert(&conn, &path(name), &hash_bytes(name.as_bytes()), at(0), staged)
                .unwrap();
        }

        let staged: Vec<_> = TrackingTable::list_staged(&conn)
            .unwrap()
            .into_iter()
            .map(|f| f.path.to_string())
            .collect();
        assert_eq!(staged, vec!["a.txt", "b.txt"]);

        let cleared = TrackingTable::clear_staged(&conn, &[path("a.txt"), path("c.txt")]).unwrap();
        assert_eq!(cleared, 1);

        let staged = TrackingTable::list_staged(&conn).unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].path, path("b.txt"));
    }

    #[test]
    fn test_corrupted_row_detected() {
        let conn = setup();
        conn.execute(
            "INSERT INTO files (path, last_hash, last_modified, staged) VALUES ('a.txt', 'nothex', 0, 0)",
            [],
        )
        .unwrap();

        let result = TrackingTable::list(&conn);
        assert!(matches!(result, Err(StorageError::CorruptedData { .. })));
    }

    #[test]
    fn test_unix_seconds_roundtrip() {
        let time = Utc.timestamp_opt(1_700_000_000, 250_000_000).single().unwrap();
        assert_eq!(from_unix_seconds(to_unix_seconds(time)), Some(time));
        assert_eq!(from_unix_seconds(f64::NAN), None);
    }
}
