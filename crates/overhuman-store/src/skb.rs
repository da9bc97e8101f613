//! The cross-agent shared knowledge base.
//!
//! Each agent owns one instance; knowledge travels between instances only
//! through [`SharedKnowledgeBase::propagate`], which copies the fittest
//! entries and tags them with the transfer direction.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use overhuman_types::memory::{PropagationDirection, SkbEntry, SkbKind};
use overhuman_types::{OverhumanError, Result};

use crate::long_term::parse_timestamp;
use crate::store::{Store, db_err, join_tags, split_tags};

const SELECT: &str =
    "SELECT id, kind, agent, content, tags, fitness, usage_count, created_at, updated_at \
     FROM skb_entries";

/// One agent's view of the shared knowledge base.
#[derive(Clone)]
pub struct SharedKnowledgeBase {
    store: Store,
}

impl SharedKnowledgeBase {
    /// Attach to the shared store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or replace an entry by id.
    pub fn insert(&self, entry: &SkbEntry) -> Result<()> {
        let conn = self.store.lock();
        conn.execute(
            "INSERT OR REPLACE INTO skb_entries \
             (id, kind, agent, content, tags, fitness, usage_count, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.kind.as_str(),
                entry.agent,
                entry.content,
                join_tags(&entry.tags),
                entry.fitness,
                entry.usage_count as i64,
                entry.created_at.to_rfc3339(),
                entry.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Substring search across content and tags.
    ///
    /// Ordered by fitness descending, then usage descending.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SkbEntry>> {
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT} WHERE content LIKE ?1 ESCAPE '\\' OR tags LIKE ?1 ESCAPE '\\' \
                 ORDER BY fitness DESC, usage_count DESC LIMIT ?2"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], row_to_skb)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// All entries of one kind, fittest first.
    pub fn by_kind(&self, kind: SkbKind) -> Result<Vec<SkbEntry>> {
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT} WHERE kind = ?1 ORDER BY fitness DESC, usage_count DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![kind.as_str()], row_to_skb)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// All entries contributed by one agent, fittest first.
    pub fn by_agent(&self, agent: &str) -> Result<Vec<SkbEntry>> {
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT} WHERE agent = ?1 ORDER BY fitness DESC, usage_count DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map(params![agent], row_to_skb).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// The `n` fittest entries.
    pub fn top(&self, n: usize) -> Result<Vec<SkbEntry>> {
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT} ORDER BY fitness DESC, usage_count DESC LIMIT ?1"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![n as i64], row_to_skb)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Record one use of an entry.
    ///
    /// Increments the usage count and folds `observed_fitness` into the
    /// running mean with the same formula the pattern tracker uses:
    /// `(fitness·uses + observed) / (uses + 1)`.
    ///
    /// # Errors
    ///
    /// [`OverhumanError::NotFound`] on an unknown id.
    pub fn record_use(&self, id: &str, observed_fitness: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.store.lock();
        let changed = conn
            .execute(
                "UPDATE skb_entries SET \
                     fitness = (fitness * usage_count + ?2) / (usage_count + 1), \
                     usage_count = usage_count + 1, \
                     updated_at = ?3 \
                 WHERE id = ?1",
                params![id, observed_fitness.clamp(0.0, 1.0), now],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(OverhumanError::not_found(format!("skb entry {id}")));
        }
        Ok(())
    }

    /// Delete an entry. Deleting an unknown id is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.store.lock();
        conn.execute("DELETE FROM skb_entries WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Number of entries held.
    pub fn count(&self) -> Result<u64> {
        let conn = self.store.lock();
        let n: i64 = conn
            .query_row("SELECT count(*) FROM skb_entries", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as u64)
    }

    /// Fetch one entry by id.
    pub fn get(&self, id: &str) -> Result<Option<SkbEntry>> {
        let conn = self.store.lock();
        conn.query_row(&format!("{SELECT} WHERE id = ?1"), params![id], row_to_skb)
            .optional()
            .map_err(db_err)
    }

    /// Copy the top-`k` entries with fitness at or above `min_fitness`
    /// into `target`, tagging each with `"propagated"` and the direction.
    ///
    /// Returns the number of entries copied. Propagation is the only
    /// operation that crosses instances.
    pub fn propagate(
        &self,
        target: &SharedKnowledgeBase,
        k: usize,
        min_fitness: f64,
        direction: PropagationDirection,
    ) -> Result<usize> {
        let candidates: Vec<SkbEntry> = {
            let conn = self.store.lock();
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT} WHERE fitness >= ?1 \
                     ORDER BY fitness DESC, usage_count DESC LIMIT ?2"
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![min_fitness, k as i64], row_to_skb)
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)?
        };

        let mut moved = 0;
        for mut entry in candidates {
            entry.tags.push("propagated".into());
            entry.tags.push(direction.as_str().into());
            entry.updated_at = Utc::now();
            target.insert(&entry)?;
            moved += 1;
        }
        debug!(moved, direction = direction.as_str(), "skb propagation complete");
        Ok(moved)
    }
}

fn row_to_skb(row: &rusqlite::Row<'_>) -> rusqlite::Result<SkbEntry> {
    let kind: String = row.get(1)?;
    let tags: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(SkbEntry {
        id: row.get(0)?,
        kind: SkbKind::parse(&kind).unwrap_or(SkbKind::Insight),
        agent: row.get(2)?,
        content: row.get(3)?,
        tags: split_tags(&tags),
        fitness: row.get(5)?,
        usage_count: row.get::<_, i64>(6)? as u64,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}
