//! SQLite session management for stores queried by add-in commands.
//!
//! CHANGELOG:
//! - 10/12/2026 - Store directory resolution and read-only sessions

use rusqlite::{Connection, OpenFlags};
use std::path::{Component, Path, PathBuf};

/// Default directory holding the stores DBSIZE can look at.
pub fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".addin-server")
        .join("stores")
}

/// Resolve a store name relative to `store_dir`.
///
/// Returns `None` for names that would escape the directory (absolute paths,
/// `..`, empty names).
pub fn resolve_store_path(store_dir: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    if name.trim().is_empty() {
        return None;
    }
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }
    Some(store_dir.join(relative))
}

/// Open a read-only session on an existing store file.
pub fn open_store(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Open a session not tied to any store, for engine-level queries.
pub fn open_session() -> rusqlite::Result<Connection> {
    Connection::open_in_memory()
}
