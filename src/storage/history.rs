//!  Commit creation and history traversal
//!
//!  The history is an append-only, singly linked list of commits. Each
//!  commit carries a strictly increasing sequence number which, not the
//!  wall-clock timestamp, decides which commit is the head. Timestamps are
//!  clamped so they never run backwards along the sequence.
//!
//!  Commit entries record the full snapshot of staged paths, not a delta.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use sha1::{Digest as _, Sha1};
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, Digest, RepoPath};

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub id: CommitId,
    /// position in the history, starting at 1
    pub seq: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub parent_id: Option<CommitId>,
}

impl Commit {
    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// one (path, digest) pair captured by a commit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CommitEntry {
    pub path: RepoPath,
    pub hash: Digest,
}

impl CommitEntry {
    pub fn new(path: RepoPath, hash: Digest) -> Self {
        Self { path, hash }
    }
}

/// Access to the `commits` and `commit_entries` relations.
pub struct HistoryStore;

impl HistoryStore {
    /// Append a commit after the current head.
    ///
    /// The id is a SHA-1 over the sequence number, parent, message,
    /// timestamp and the sorted entries. Entries are only hashed here; use
    /// [`HistoryStore::record_entries`] to persist them.
    pub fn append_commit(
        conn: &Connection,
        message: &str,
        parent_id: Option<CommitId>,
        now: DateTime<Utc>,
        entries: &[CommitEntry],
    ) -> StorageResult<Commit> {
        let head = Self::head(conn)?;
        if let Some(parent) = parent_id {
            if Self::get(conn, parent)?.is_none() {
                return Err(StorageError::Internal(format!(
                    "parent commit {} does not exist",
                    parent
                )));
            }
        }

        let seq = head.as_ref().map_or(1, |h| h.seq + 1);
        // stored with microsecond precision
        let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
        let timestamp = match &head {
            Some(h) if h.timestamp > now => h.timestamp,
            _ => now,
        };
        let id = commit_id(seq, parent_id, message, timestamp, entries);

        conn.execute(
            "INSERT INTO commits (id, seq, message, timestamp, parent_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                id.to_hex(),
                seq as i64,
                message,
                format_timestamp(timestamp),
                parent_id.map(|p| p.to_hex()),
            ),
        )?;
        debug!(%id, seq, "appended commit");

        Ok(Commit {
            id,
            seq,
            message: message.to_string(),
            timestamp,
            parent_id,
        })
    }

    /// bulk-insert the snapshot entries of a commit
    pub fn record_entries(
        conn: &Connection,
        commit_id: CommitId,
        entries: &[CommitEntry],
    ) -> StorageResult<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO commit_entries (commit_id, file_path, file_hash) VALUES (?1, ?2, ?3)",
        )?;
        let id = commit_id.to_hex();
        for entry in entries {
            stmt.execute((&id, entry.path.as_str(), entry.hash.to_hex()))?;
        }
        debug!(%commit_id, count = entries.len(), "recorded commit entries");
        Ok(())
    }

    /// the most recently appended commit
    pub fn head(conn: &Connection) -> StorageResult<Option<Commit>> {
        let raw = conn
            .query_row(
                "SELECT id, seq, message, timestamp, parent_id FROM commits
                 ORDER BY seq DESC LIMIT 1",
                [],
                RawCommit::from_row,
            )
            .optional()?;
        raw.map(RawCommit::decode).transpose()
    }

    pub fn get(conn: &Connection, id: CommitId) -> StorageResult<Option<Commit>> {
        let raw = conn
            .query_row(
                "SELECT id, seq, message, timestamp, parent_id FROM commits WHERE id = ?1",
                [id.to_hex()],
                RawCommit::from_row,
            )
            .optional()?;
        raw.map(RawCommit::decode).transpose()
    }

    /// the snapshot recorded by a commit, ordered by path
    pub fn entries_of(conn: &Connection, id: CommitId) -> StorageResult<Vec<CommitEntry>> {
        let mut stmt = conn.prepare(
            "SELECT file_path, file_hash FROM commit_entries
             WHERE commit_id = ?1 ORDER BY file_path",
        )?;
        let rows = stmt.query_map([id.to_hex()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (path, hash) = row?;
            let key = format!("commit_entries/{}/{}", id, path);
            let path = RepoPath::new(&path)
                .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
            let hash = Digest::from_hex(&hash)
                .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
            entries.push(CommitEntry { path, hash });
        }
        Ok(entries)
    }

    /// commits newest first, optionally limited
    pub fn history(conn: &Connection, limit: Option<usize>) -> StorageResult<Vec<Commit>> {
        let limit = limit.map_or(-1, |n| n.min(i64::MAX as usize) as i64);
        let mut stmt = conn.prepare(
            "SELECT id, seq, message, timestamp, parent_id FROM commits
             ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], RawCommit::from_row)?;

        let mut commits = Vec::new();
        for raw in rows {
            commits.push(raw?.decode()?);
        }
        Ok(commits)
    }

    /// ids starting with `prefix` (lowercase hex)
    pub fn find_by_prefix(conn: &Connection, prefix: &str) -> StorageResult<Vec<CommitId>> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Vec::new());
        }
        let pattern = format!("{}%", prefix.to_ascii_lowercase());
        let mut stmt = conn.prepare("SELECT id FROM commits WHERE id LIKE ?1 ORDER BY seq")?;
        let rows = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            let id = CommitId::from_hex(&raw)
                .map_err(|e| StorageError::corrupted(format!("commits/{}", raw), e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn count(conn: &Connection) -> StorageResult<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn commit_id(
    seq: u64,
    parent_id: Option<CommitId>,
    message: &str,
    timestamp: DateTime<Utc>,
    entries: &[CommitEntry],
) -> CommitId {
    let mut sorted: Vec<&CommitEntry> = entries.iter().collect();
    sorted.sort();

    let mut hasher = Sha1::new();
    hasher.update(format!("seq {}\n", seq));
    match parent_id {
        Some(parent) => hasher.update(format!("parent {}\n", parent)),
        None => hasher.update(b"parent -\n"),
    }
    hasher.update(format!("time {}\n", format_timestamp(timestamp)));
    hasher.update(format!("message {}\n", message.len()));
    hasher.update(message.as_bytes());
    for entry in sorted {
        hasher.update(b"\n");
        hasher.update(entry.path.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(entry.hash.as_bytes());
    }

    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    CommitId::new(Digest::from_bytes(out))
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// column values as stored, before validation
struct RawCommit {
    id: String,
    seq: i64,
    message: String,
    timestamp: String,
    parent_id: Option<String>,
}

impl RawCommit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seq: row.get(1)?,
            message: row.get(2)?,
            timestamp: row.get(3)?,
            parent_id: row.get(4)?,
        })
    }

    fn decode(self) -> StorageResult<Commit> {
        let key = format!("commits/{}", self.id);
        let id = CommitId::from_hex(&self.id)
            .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
        let parent_id = self
            .parent_id
            .as_deref()
            .map(CommitId::from_hex)
            .transpose()
            .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| StorageError::corrupted(&key, e.to_string()))?
            .with_timezone(&Utc);
        let seq = u64::try_from(self.seq)
            .map_err(|_| StorageError::corrupted(&key, format!("negative sequence {}", self.seq)))?;

        Ok(Commit {
            id,
            seq,
            message: self.message,
            timestamp,
            parent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::objects::hash_bytes;
    use crate::storage::schema;
    use chrono::{Duration, TimeZone};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        schema::create(&conn).unwrap();
        conn
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap()
    }

    fn entry(path: &str, content: &[u8]) -> CommitEntry {
        CommitEntry::new(RepoPath::new(path).unwrap(), hash_bytes(content))
    }

    /// append at head, the way the controller does
    fn append(conn: &Connection, message: &str, now: DateTime<Utc>) -> Commit {
        let parent = HistoryStore::head(conn).unwrap().map(|c| c.id);
        HistoryStore::append_commit(conn, message, parent, now, &[]).unwrap()
    }

    #[test]
    fn test_first_commit_has_no_parent() {
        let conn = setup();
        assert!(HistoryStore::head(&conn).unwrap().is_none());

        let commit = append(&conn, "first", t0());
        assert!(commit.is_root());
        assert_eq!(commit.seq, 1);
        assert_eq!(HistoryStore::head(&conn).unwrap(), Some(commit));
    }

    #[test]
    fn test_history_newest_first() {
        let conn = setup();
        let c1 = append(&conn, "one", t0());
        let c2 = append(&conn, "two", t0() + Duration::seconds(1));
        let c3 = append(&conn, "three", t0() + Duration::seconds(2));

        assert_eq!(c2.parent_id, Some(c1.id));
        assert_eq!(c3.parent_id, Some(c2.id));

        let ids: Vec<_> = HistoryStore::history(&conn, None)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![c3.id, c2.id, c1.id]);

        let limited = HistoryStore::history(&conn, Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, c3.id);
    }

    #[test]
    fn test_same_timestamp_still_ordered() {
        let conn = setup();
        let c1 = append(&conn, "same", t0());
        let c2 = append(&conn, "same", t0());

        assert_ne!(c1.id, c2.id);
        assert_eq!(HistoryStore::head(&conn).unwrap().unwrap().id, c2.id);
    }

    #[test]
    fn test_clock_skew_clamped() {
        let conn = setup();
        let c1 = append(&conn, "later", t0());
        let c2 = append(&conn, "earlier clock", t0() - Duration::hours(1));

        assert_eq!(c2.timestamp, c1.timestamp);
        assert_eq!(HistoryStore::head(&conn).unwrap().unwrap().id, c2.id);

        let history = HistoryStore::history(&conn, None).unwrap();
        assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_entries_roundtrip() {
        let conn = setup();
        let entries = vec![entry("b.txt", b"b"), entry("a.txt", b"a")];
        let commit =
            HistoryStore::append_commit(&conn, "snapshot", None, t0(), &entries).unwrap();
        HistoryStore::record_entries(&conn, commit.id, &entries).unwrap();

        let stored = HistoryStore::entries_of(&conn, commit.id).unwrap();
        assert_eq!(stored, vec![entry("a.txt", b"a"), entry("b.txt", b"b")]);
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let conn = setup();
        let commit = append(&conn, "dup", t0());
        let entries = vec![entry("a.txt", b"1"), entry("a.txt", b"2")];
        assert!(HistoryStore::record_entries(&conn, commit.id, &entries).is_err());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let conn = setup();
        let bogus = CommitId::new(hash_bytes(b"nope"));
        let result = HistoryStore::append_commit(&conn, "orphan", Some(bogus), t0(), &[]);
        assert!(matches!(result, Err(StorageError::Internal(_))));
    }

    #[test]
    fn test_find_by_prefix() {
        let conn = setup();
        let commit = append(&conn, "one", t0());
        let hex = commit.id.to_hex();

        assert_eq!(HistoryStore::find_by_prefix(&conn, &hex[..6]).unwrap(), vec![commit.id]);
        assert_eq!(
            HistoryStore::find_by_prefix(&conn, &hex[..6].to_uppercase()).unwrap(),
            vec![commit.id]
        );
        assert!(HistoryStore::find_by_prefix(&conn, "xyz").unwrap().is_empty());
        assert!(HistoryStore::find_by_prefix(&conn, "").unwrap().is_empty());
        assert_eq!(HistoryStore::count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_commit_id_depends_on_entries() {
        let a = commit_id(1, None, "m", t0(), &[entry("a.txt", b"1")]);
        let b = commit_id(1, None, "m", t0(), &[entry("a.txt", b"2")]);
        let c = commit_id(1, None, "m", t0(), &[entry("a.txt", b"1")]);
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
