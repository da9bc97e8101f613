//! The shared SQLite handle.
//!
//! One database file (`overhuman.db`) backs long-term memory, the pattern
//! tracker, and the shared knowledge base. The connection is wrapped in
//! `Arc<Mutex<Connection>>`; every mutation runs inside a transaction on
//! that connection, and WAL mode keeps readers unblocked during writes.
//!
//! The full-text index (`long_term_fts`) mirrors
//! `long_term_memory(summary, tags)` and is updated in the same transaction
//! as the base table, so a search issued after a commit can never miss the
//! committed row.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;

use overhuman_types::{OverhumanError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS long_term_memory (
    id         TEXT PRIMARY KEY,
    summary    TEXT NOT NULL,
    tags       TEXT NOT NULL DEFAULT '',
    run_id     TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS long_term_fts USING fts5(
    id UNINDEXED,
    summary,
    tags
);

CREATE TABLE IF NOT EXISTS patterns (
    fingerprint TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    count       INTEGER NOT NULL,
    avg_quality REAL NOT NULL,
    last_seen   TEXT NOT NULL,
    skill_id    TEXT
);

CREATE TABLE IF NOT EXISTS skb_entries (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    agent       TEXT NOT NULL,
    content     TEXT NOT NULL,
    tags        TEXT NOT NULL DEFAULT '',
    fitness     REAL NOT NULL,
    usage_count INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

/// Convert a rusqlite error into the workspace error type.
pub(crate) fn db_err(e: rusqlite::Error) -> OverhumanError {
    OverhumanError::Storage(e.to_string())
}

/// Shared handle to the embedded database.
///
/// Cheap to clone; all clones share one connection. Concurrency follows the
/// store contract: mutations serialize on the mutex, and WAL mode lets
/// other processes (admin tools) read during writes.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        debug!(path = %path.display(), "opened store");
        Self::init(conn)
    }

    /// An in-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL permits concurrent readers while a write transaction holds
        // the single writer slot. The pragma returns the resulting mode
        // (in-memory databases answer "memory"); read and discard it.
        let _ = conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()));
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the underlying connection.
    ///
    /// Used by the component stores; hold the guard only for the duration
    /// of one statement or transaction.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Flush the WAL and run `PRAGMA optimize`.
    ///
    /// The connection itself is closed when the last clone drops; this
    /// makes shutdown deterministic for the file on disk.
    pub fn close(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE); PRAGMA optimize;")
            .map_err(db_err)?;
        debug!("store checkpointed");
        Ok(())
    }
}

/// Join tags for storage. The inverse of [`split_tags`].
pub(crate) fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

/// Split a stored tag string back into a list, dropping empties.
pub(crate) fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("overhuman.db")).unwrap();
        let conn = store.lock();
        let n: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type IN ('table','view') \
                 AND name IN ('long_term_memory','patterns','skb_entries')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overhuman.db");
        let first = Store::open(&path).unwrap();
        first.close().unwrap();
        drop(first);
        // Reopening an existing database must not fail on CREATE IF NOT EXISTS.
        let _second = Store::open(&path).unwrap();
    }

    #[test]
    fn clones_share_one_connection() {
        let store = Store::in_memory().unwrap();
        let clone = store.clone();
        store
            .lock()
            .execute("INSERT INTO patterns VALUES ('fp','d',1,0.5,'2026-01-01T00:00:00Z',NULL)", [])
            .unwrap();
        let n: i64 = clone
            .lock()
            .query_row("SELECT count(*) FROM patterns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn tag_join_split_roundtrip() {
        let tags = vec!["reflection".to_string(), "meso".to_string()];
        assert_eq!(join_tags(&tags), "reflection,meso");
        assert_eq!(split_tags("reflection,meso"), tags);
        assert_eq!(split_tags(""), Vec::<String>::new());
        assert_eq!(split_tags("a,,b"), vec!["a".to_string(), "b".to_string()]);
    }
}
