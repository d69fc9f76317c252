//! Store lookups used by command handlers.
//!
//! Every call opens its own session and drops it before returning, so no
//! connection outlives the command that needed it.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

use rusqlite::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

use super::connection::{open_session, open_store, resolve_store_path};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store {0} not found")]
    NotFound(String),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// External data source the VER and DBSIZE commands query.
pub trait StoreBackend {
    /// Version string of the runtime backing the stores.
    fn runtime_version(&self) -> Result<String, StoreError>;

    /// Size in bytes of the named store.
    fn store_size(&self, name: &str) -> Result<u64, StoreError>;
}

/// SQLite files under a store directory.
pub struct SqliteStore {
    store_dir: PathBuf,
}

impl SqliteStore {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }
}

impl StoreBackend for SqliteStore {
    fn runtime_version(&self) -> Result<String, StoreError> {
        let session = open_session()?;
        let version: String = session.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
        Ok(format!("SQLite {}", version))
    }

    fn store_size(&self, name: &str) -> Result<u64, StoreError> {
        let not_found = || StoreError::NotFound(name.to_string());

        let path = resolve_store_path(&self.store_dir, name).ok_or_else(not_found)?;
        if !path.is_file() {
            return Err(not_found());
        }

        // An unreadable file is reported the same way as a missing one
        let session = open_store(&path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "store open failed");
            not_found()
        })?;

        let page_count: i64 = session
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::NotADatabase) | Some(ErrorCode::CannotOpen) => not_found(),
                _ => StoreError::Sqlite(e),
            })?;
        let page_size: i64 = session.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok((page_count.max(0) as u64) * (page_size.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn make_store(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
             INSERT INTO notes (body) VALUES ('first'), ('second');",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_runtime_version() {
        let store = SqliteStore::new("/nonexistent");
        let version = store.runtime_version().unwrap();
        assert!(version.starts_with("SQLite 3."));
    }

    #[test]
    fn test_store_size_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_store(dir.path(), "sales.db");
        let store = SqliteStore::new(dir.path());

        let size = store.store_size("sales.db").unwrap();
        assert!(size > 0);
        assert_eq!(size, std::fs::metadata(path).unwrap().len());
    }

    #[test]
    fn test_missing_store_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path());
        let err = store.store_size("Sales.nsf").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "Sales.nsf"));
    }

    #[test]
    fn test_non_database_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junk.db"), "not a database ".repeat(100)).unwrap();
        let store = SqliteStore::new(dir.path());
        assert!(matches!(
            store.store_size("junk.db"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_escaping_name_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path());
        assert!(matches!(
            store.store_size("../outside.db"),
            Err(StoreError::NotFound(_))
        ));
    }
}
