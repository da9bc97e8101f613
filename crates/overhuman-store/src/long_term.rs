//! Durable long-term memory with full-text retrieval.
//!
//! Entries are summaries written by the pipeline's memory stage and by the
//! reflection engine. Inserts are insert-or-replace by id; the core never
//! deletes (external admin tools may garbage-collect). Every write updates
//! the FTS mirror inside the same transaction.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use overhuman_types::Result;
use overhuman_types::memory::LongTermEntry;

use crate::store::{Store, db_err, join_tags, split_tags};

/// The durable long-term memory store.
#[derive(Clone)]
pub struct LongTermMemory {
    store: Store,
}

impl LongTermMemory {
    /// Attach to the shared store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or replace an entry by id.
    ///
    /// The FTS mirror row is replaced in the same transaction, so a search
    /// issued after this returns sees the new content.
    pub fn insert(&self, entry: &LongTermEntry) -> Result<()> {
        let mut conn = self.store.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let tags = join_tags(&entry.tags);
        tx.execute(
            "INSERT OR REPLACE INTO long_term_memory (id, summary, tags, run_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id,
                entry.summary,
                tags,
                entry.run_id,
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        tx.execute("DELETE FROM long_term_fts WHERE id = ?1", params![entry.id])
            .map_err(db_err)?;
        tx.execute(
            "INSERT INTO long_term_fts (id, summary, tags) VALUES (?1, ?2, ?3)",
            params![entry.id, entry.summary, tags],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!(id = %entry.id, "long-term entry stored");
        Ok(())
    }

    /// Full-text search, ordered by relevance (bm25), up to `limit` rows.
    ///
    /// The raw query is tokenized and quoted before reaching FTS5, so user
    /// text cannot break the MATCH syntax; tokens are OR-combined because a
    /// hit on any token of summary or tags must surface the entry.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LongTermEntry>> {
        let Some(fts_query) = sanitize_fts_query(query) else {
            return Ok(Vec::new());
        };
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.summary, m.tags, m.run_id, m.created_at \
                 FROM long_term_fts f \
                 JOIN long_term_memory m ON m.id = f.id \
                 WHERE long_term_fts MATCH ?1 \
                 ORDER BY bm25(long_term_fts) \
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// The `limit` most recently created entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<LongTermEntry>> {
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, summary, tags, run_id, created_at \
                 FROM long_term_memory ORDER BY created_at DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Fetch one entry by id.
    pub fn get(&self, id: &str) -> Result<Option<LongTermEntry>> {
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, summary, tags, run_id, created_at \
                 FROM long_term_memory WHERE id = ?1",
            )
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![id], row_to_entry).map_err(db_err)?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(db_err)?)),
            None => Ok(None),
        }
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LongTermEntry> {
    let tags: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(LongTermEntry {
        id: row.get(0)?,
        summary: row.get(1)?,
        tags: split_tags(&tags),
        run_id: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Quote each whitespace token and OR them together for FTS5.
///
/// Returns `None` when no usable token remains.
fn sanitize_fts_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> LongTermMemory {
        LongTermMemory::new(Store::in_memory().unwrap())
    }

    fn entry(id: &str, summary: &str, tags: &[&str]) -> LongTermEntry {
        LongTermEntry::new(
            id,
            summary,
            tags.iter().map(|t| t.to_string()).collect(),
            "run-1",
        )
    }

    #[test]
    fn insert_then_search_finds_entry() {
        let mem = memory();
        mem.insert(&entry("e1", "summarized the quarterly report", &["work"]))
            .unwrap();

        let hits = mem.search("quarterly", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "e1");
        assert_eq!(hits[0].tags, vec!["work".to_string()]);
    }

    #[test]
    fn search_matches_any_token() {
        let mem = memory();
        mem.insert(&entry("e1", "translated a contract to french", &[]))
            .unwrap();
        // One matching token among garbage still hits.
        let hits = mem.search("zzz_nothing contract", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn search_matches_tags() {
        let mem = memory();
        mem.insert(&entry("e1", "some text", &["reflection", "meso"]))
            .unwrap();
        let hits = mem.search("meso", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn search_survives_hostile_query() {
        let mem = memory();
        mem.insert(&entry("e1", "plain text", &[])).unwrap();
        // FTS5 operators and quotes must not produce a syntax error.
        assert!(mem.search("\"unbalanced AND (NEAR", 10).unwrap().len() <= 1);
        assert!(mem.search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn replace_by_id_updates_index() {
        let mem = memory();
        mem.insert(&entry("e1", "original wording", &[])).unwrap();
        mem.insert(&entry("e1", "replacement wording", &[])).unwrap();

        assert!(mem.search("original", 10).unwrap().is_empty());
        let hits = mem.search("replacement", 10).unwrap();
        assert_eq!(hits.len(), 1);

        // Still a single row in the base table.
        let all = mem.recent(10).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn recent_orders_newest_first() {
        let mem = memory();
        let mut older = entry("old", "first entry", &[]);
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        mem.insert(&older).unwrap();
        mem.insert(&entry("new", "second entry", &[])).unwrap();

        let recents = mem.recent(10).unwrap();
        assert_eq!(recents[0].id, "new");
        assert_eq!(recents[1].id, "old");
    }

    #[test]
    fn recent_respects_limit() {
        let mem = memory();
        for i in 0..5 {
            mem.insert(&entry(&format!("e{i}"), "entry text", &[]))
                .unwrap();
        }
        assert_eq!(mem.recent(3).unwrap().len(), 3);
    }

    #[test]
    fn get_by_id() {
        let mem = memory();
        mem.insert(&entry("e1", "stored", &["a", "b"])).unwrap();
        let got = mem.get("e1").unwrap().unwrap();
        assert_eq!(got.summary, "stored");
        assert_eq!(got.tags.len(), 2);
        assert!(mem.get("missing").unwrap().is_none());
    }

    #[test]
    fn timestamps_roundtrip() {
        let mem = memory();
        let e = entry("e1", "stamped", &[]);
        let stamp = e.created_at;
        mem.insert(&e).unwrap();
        let got = mem.get("e1").unwrap().unwrap();
        // RFC3339 keeps sub-second precision.
        assert_eq!(got.created_at.timestamp_millis(), stamp.timestamp_millis());
    }
}
