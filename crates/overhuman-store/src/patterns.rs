//! The pattern tracker.
//!
//! Fingerprints recurring task shapes and keeps running statistics per
//! fingerprint. The incremental mean is computed inside the SQL upsert
//! against the pre-update row, so concurrent readers never observe a
//! half-applied observation.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::debug;

use overhuman_types::memory::PatternEntry;
use overhuman_types::{OverhumanError, Result};

use crate::long_term::parse_timestamp;
use crate::store::{Store, db_err};

/// Running-statistics tracker keyed by task fingerprint.
#[derive(Clone)]
pub struct PatternTracker {
    store: Store,
}

impl PatternTracker {
    /// Attach to the shared store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Deterministic fingerprint of a task shape.
    ///
    /// SHA-256 over `goal ∥ "|" ∥ task_type`, lowercase hex. The separator
    /// byte keeps distinct goal/type splits from colliding.
    pub fn fingerprint(goal: &str, task_type: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(goal.as_bytes());
        hasher.update(b"|");
        hasher.update(task_type.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    /// Record one observation of a fingerprint.
    ///
    /// First observation inserts count=1, avg=quality. Subsequent ones
    /// increment the count and fold the quality into the running mean
    /// `(avg·n + q) / (n+1)`. The description is overwritten with the
    /// latest observed value and the last-seen timestamp refreshed.
    /// Returns the post-update entry.
    pub fn record(
        &self,
        fingerprint: &str,
        description: &str,
        quality: f64,
    ) -> Result<PatternEntry> {
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.store.lock();
            conn.execute(
                "INSERT INTO patterns (fingerprint, description, count, avg_quality, last_seen, skill_id) \
                 VALUES (?1, ?2, 1, ?3, ?4, NULL) \
                 ON CONFLICT(fingerprint) DO UPDATE SET \
                     count = count + 1, \
                     avg_quality = (avg_quality * count + ?3) / (count + 1), \
                     description = ?2, \
                     last_seen = ?4",
                params![fingerprint, description, quality, now],
            )
            .map_err(db_err)?;
        }
        let entry = self
            .get(fingerprint)?
            .ok_or_else(|| OverhumanError::not_found(format!("fingerprint {fingerprint}")))?;
        debug!(
            fingerprint = %&fingerprint[..fingerprint.len().min(12)],
            count = entry.count,
            avg_quality = entry.avg_quality,
            "pattern observation recorded"
        );
        Ok(entry)
    }

    /// All entries with `count >= threshold` and no linked skill, ordered
    /// by count descending.
    pub fn automatable(&self, threshold: u64) -> Result<Vec<PatternEntry>> {
        let conn = self.store.lock();
        let mut stmt = conn
            .prepare(
                "SELECT fingerprint, description, count, avg_quality, last_seen, skill_id \
                 FROM patterns \
                 WHERE count >= ?1 AND (skill_id IS NULL OR skill_id = '') \
                 ORDER BY count DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![threshold as i64], row_to_pattern)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Link a synthesized skill to a fingerprint.
    ///
    /// # Errors
    ///
    /// [`OverhumanError::NotFound`] when the fingerprint has never been
    /// recorded.
    pub fn link(&self, fingerprint: &str, skill_id: &str) -> Result<()> {
        let conn = self.store.lock();
        let changed = conn
            .execute(
                "UPDATE patterns SET skill_id = ?2 WHERE fingerprint = ?1",
                params![fingerprint, skill_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(OverhumanError::not_found(format!(
                "fingerprint {fingerprint}"
            )));
        }
        Ok(())
    }

    /// Fetch one entry.
    pub fn get(&self, fingerprint: &str) -> Result<Option<PatternEntry>> {
        let conn = self.store.lock();
        conn.query_row(
            "SELECT fingerprint, description, count, avg_quality, last_seen, skill_id \
             FROM patterns WHERE fingerprint = ?1",
            params![fingerprint],
            row_to_pattern,
        )
        .optional()
        .map_err(db_err)
    }
}

fn row_to_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatternEntry> {
    let last_seen: String = row.get(4)?;
    let skill_id: Option<String> = row.get(5)?;
    Ok(PatternEntry {
        fingerprint: row.get(0)?,
        description: row.get(1)?,
        count: row.get::<_, i64>(2)? as u64,
        avg_quality: row.get(3)?,
        last_seen: parse_timestamp(&last_seen),
        skill_id: skill_id.filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PatternTracker {
        PatternTracker::new(Store::in_memory().unwrap())
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = PatternTracker::fingerprint("summarize article", "summarize");
        let b = PatternTracker::fingerprint("summarize article", "summarize");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_separator_prevents_split_collisions() {
        // "ab" + "c" vs "a" + "bc" must differ.
        let a = PatternTracker::fingerprint("ab", "c");
        let b = PatternTracker::fingerprint("a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn first_record_initializes() {
        let t = tracker();
        let fp = PatternTracker::fingerprint("goal", "type");
        let e = t.record(&fp, "do the thing", 0.8).unwrap();
        assert_eq!(e.count, 1);
        assert!((e.avg_quality - 0.8).abs() < 1e-9);
        assert!(e.skill_id.is_none());
    }

    #[test]
    fn running_average_is_exact_mean() {
        let t = tracker();
        let fp = PatternTracker::fingerprint("summarize article", "summarize");
        for q in [0.8, 0.9, 1.0] {
            t.record(&fp, "summarize article", q).unwrap();
        }
        let e = t.get(&fp).unwrap().unwrap();
        assert_eq!(e.count, 3);
        assert!((e.avg_quality - 0.9).abs() < 1e-6);
    }

    #[test]
    fn mean_over_many_observations() {
        let t = tracker();
        let fp = PatternTracker::fingerprint("g", "t");
        let qualities: Vec<f64> = (0..25).map(|i| (i as f64) / 24.0).collect();
        for q in &qualities {
            t.record(&fp, "g", *q).unwrap();
        }
        let expected: f64 = qualities.iter().sum::<f64>() / qualities.len() as f64;
        let e = t.get(&fp).unwrap().unwrap();
        assert_eq!(e.count, qualities.len() as u64);
        assert!((e.avg_quality - expected).abs() < 1e-6);
    }

    #[test]
    fn record_overwrites_description() {
        let t = tracker();
        let fp = PatternTracker::fingerprint("g", "t");
        t.record(&fp, "old words", 0.5).unwrap();
        let e = t.record(&fp, "new words", 0.5).unwrap();
        assert_eq!(e.description, "new words");
    }

    #[test]
    fn automatable_filters_and_orders() {
        let t = tracker();
        let busy = PatternTracker::fingerprint("busy", "t");
        let busier = PatternTracker::fingerprint("busier", "t");
        let quiet = PatternTracker::fingerprint("quiet", "t");
        for _ in 0..3 {
            t.record(&busy, "busy", 0.9).unwrap();
        }
        for _ in 0..5 {
            t.record(&busier, "busier", 0.9).unwrap();
        }
        t.record(&quiet, "quiet", 0.9).unwrap();

        let auto = t.automatable(3).unwrap();
        assert_eq!(auto.len(), 2);
        assert_eq!(auto[0].fingerprint, busier);
        assert_eq!(auto[1].fingerprint, busy);
    }

    #[test]
    fn linked_skill_removes_from_automatable() {
        let t = tracker();
        let fp = PatternTracker::fingerprint("g", "t");
        for _ in 0..4 {
            t.record(&fp, "g", 1.0).unwrap();
        }
        assert_eq!(t.automatable(3).unwrap().len(), 1);

        t.link(&fp, "skill-42").unwrap();
        assert!(t.automatable(3).unwrap().is_empty());
        assert_eq!(t.get(&fp).unwrap().unwrap().skill_id.as_deref(), Some("skill-42"));
    }

    #[test]
    fn link_unknown_fingerprint_is_not_found() {
        let t = tracker();
        let err = t.link("deadbeef", "skill-1").unwrap_err();
        assert!(matches!(err, OverhumanError::NotFound { .. }));
    }

    #[test]
    fn count_never_decreases_across_link() {
        let t = tracker();
        let fp = PatternTracker::fingerprint("g", "t");
        t.record(&fp, "g", 0.4).unwrap();
        t.record(&fp, "g", 0.6).unwrap();
        t.link(&fp, "s").unwrap();
        let e = t.record(&fp, "g", 0.8).unwrap();
        assert_eq!(e.count, 3);
        // Linking must not disturb statistics.
        assert!((e.avg_quality - 0.6).abs() < 1e-6);
    }

    #[test]
    fn get_missing_returns_none() {
        let t = tracker();
        assert!(t.get("unknown").unwrap().is_none());
    }
}
