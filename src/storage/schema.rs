//! Relational schema of the metadata database.

use rusqlite::{Connection, OptionalExtension};

use crate::storage::error::{StorageError, StorageResult};

/// schema version written by this build
pub const SCHEMA_VERSION: u32 = 1;

/// `config` keys
pub const KEY_CREATED_AT: &str = "created_at";
pub const KEY_SCHEMA_VERSION: &str = "schema_version";

const DDL: &str = "
CREATE TABLE IF NOT EXISTS config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    path          TEXT PRIMARY KEY,
    last_hash     TEXT NOT NULL,
    last_modified REAL NOT NULL,
    staged        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS commits (
    id        TEXT PRIMARY KEY,
    seq       INTEGER NOT NULL UNIQUE,
    message   TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    parent_id TEXT REFERENCES commits(id)
);

CREATE TABLE IF NOT EXISTS commit_entries (
    commit_id TEXT NOT NULL REFERENCES commits(id),
    file_path TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    PRIMARY KEY (commit_id, file_path)
);

CREATE TABLE IF NOT EXISTS baselines (
    name      TEXT PRIMARY KEY,
    commit_id TEXT NOT NULL REFERENCES commits(id)
);
";

/// create every relation; safe to call on an existing database
pub fn create(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(DDL)?;
    Ok(())
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
        (key, value),
    )?;
    Ok(())
}

pub fn get_config(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// refuse to operate on a database written by a newer schema
pub fn check_version(conn: &Connection) -> StorageResult<u32> {
    let Some(raw) = get_config(conn, KEY_SCHEMA_VERSION)? else {
        // databases created before versioning carry no key
        return Ok(SCHEMA_VERSION);
    };

    let version: u32 = raw
        .parse()
        .map_err(|_| StorageError::corrupted("config/schema_version", format!("not a number: {}", raw)))?;
    if version > SCHEMA_VERSION {
        return Err(StorageError::corrupted(
            "config/schema_version",
            format!(
                "schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            ),
        ));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        create(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            tables,
            vec!["baselines", "commit_entries", "commits", "config", "files"]
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();

        assert_eq!(get_config(&conn, "missing").unwrap(), None);
        set_config(&conn, KEY_CREATED_AT, "2024-01-01T00:00:00+00:00").unwrap();
        set_config(&conn, KEY_CREATED_AT, "2024-02-01T00:00:00+00:00").unwrap();
        assert_eq!(
            get_config(&conn, KEY_CREATED_AT).unwrap().as_deref(),
            Some("2024-02-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_version_check() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        assert_eq!(check_version(&conn).unwrap(), SCHEMA_VERSION);

        set_config(&conn, KEY_SCHEMA_VERSION, "99").unwrap();
        assert!(matches!(
            check_version(&conn),
            Err(StorageError::CorruptedData { .. })
        ));
    }
}
