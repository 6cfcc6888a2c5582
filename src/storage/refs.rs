//!  Baseline (named reference) management.
//!
//!  A baseline is a human-chosen name pointing at one commit. Setting an
//!  existing name moves it; a commit may carry any number of baselines.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BaselineName, CommitId};

/// A baseline together with the message of the commit it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Baseline {
    pub name: BaselineName,
    pub commit_id: CommitId,
    pub message: String,
}

/// Access to the `baselines` relation.
pub struct ReferenceStore;

impl ReferenceStore {
    /// create or move a baseline
    pub fn set(conn: &Connection, name: &BaselineName, commit_id: CommitId) -> StorageResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO baselines (name, commit_id) VALUES (?1, ?2)",
            (name.as_str(), commit_id.to_hex()),
        )?;
        debug!(%name, %commit_id, "baseline set");
        Ok(())
    }

    /// the commit a baseline names, if it exists
    pub fn resolve(conn: &Connection, name: &str) -> StorageResult<Option<CommitId>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT commit_id FROM baselines WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|hex| {
            CommitId::from_hex(&hex)
                .map_err(|e| StorageError::corrupted(format!("baselines/{}", name), e.to_string()))
        })
        .transpose()
    }

    /// every baseline, ordered by name
    pub fn list(conn: &Connection) -> StorageResult<Vec<Baseline>> {
        let mut stmt = conn.prepare(
            "SELECT b.name, b.commit_id, c.message
             FROM baselines b JOIN commits c ON c.id = b.commit_id
             ORDER BY b.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut baselines = Vec::new();
        for row in rows {
            let (name, commit_id, message) = row?;
            let key = format!("baselines/{}", name);
            let name = BaselineName::new(name)
                .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
            let commit_id = CommitId::from_hex(&commit_id)
                .map_err(|e| StorageError::corrupted(&key, e.to_string()))?;
            baselines.push(Baseline {
                name,
                commit_id,
                message,
            });
        }
        Ok(baselines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::history::HistoryStore;
    use crate::storage::schema;
    use chrono::{TimeZone, Utc};

    fn setup_with_commits() -> (Connection, CommitId, CommitId) {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        schema::create(&conn).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        let c1 = HistoryStore::append_commit(&conn, "first", None, now, &[]).unwrap();
        let c2 = HistoryStore::append_commit(&conn, "second", Some(c1.id), now, &[]).unwrap();
        (conn, c1.id, c2.id)
    }

    fn name(n: &str) -> BaselineName {
        BaselineName::new(n).unwrap()
    }

    #[test]
    fn test_set_and_resolve() {
        let (conn, c1, _c2) = setup_with_commits();
        ReferenceStore::set(&conn, &name("v1"), c1).unwrap();

        assert_eq!(ReferenceStore::resolve(&conn, "v1").unwrap(), Some(c1));
        assert_eq!(ReferenceStore::resolve(&conn, "v2").unwrap(), None);
    }

    #[test]
    fn test_set_replaces() {
        let (conn, c1, c2) = setup_with_commits();
        ReferenceStore::set(&conn, &name("v1"), c1).unwrap();
        ReferenceStore::set(&conn, &name("v1"), c2).unwrap();

        assert_eq!(ReferenceStore::resolve(&conn, "v1").unwrap(), Some(c2));
        assert_eq!(ReferenceStore::list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_list_includes_messages() {
        let (conn, c1, c2) = setup_with_commits();
        ReferenceStore::set(&conn, &name("release"), c2).unwrap();
        ReferenceStore::set(&conn, &name("alpha"), c1).unwrap();
        ReferenceStore::set(&conn, &name("beta"), c1).unwrap();

        let listed: Vec<_> = ReferenceStore::list(&conn)
            .unwrap()
            .into_iter()
            .map(|b| (b.name.to_string(), b.commit_id, b.message))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("alpha".to_string(), c1, "first".to_string()),
                ("beta".to_string(), c1, "first".to_string()),
                ("release".to_string(), c2, "second".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_commit_rejected() {
        let (conn, _c1, _c2) = setup_with_commits();
        let bogus = CommitId::from_hex(&"0".repeat(40)).unwrap();
        assert!(ReferenceStore::set(&conn, &name("broken"), bogus).is_err());
    }
}
