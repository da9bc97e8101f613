//! The identity document ("soul").
//!
//! A markdown file with a distinguished anchor section whose bytes may
//! never change once written. Every successful update produces a numbered
//! snapshot under `soul_versions/` with JSON metadata, and rollback
//! restores any snapshot as the new current document.
//!
//! The anchor invariant is enforced on every write: the byte range between
//! the markers must be bit-identical to the previous version's, and the
//! markers themselves must be present and correctly ordered. A violating
//! candidate is rejected and the stored document is untouched.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use overhuman_types::config::DataDir;
use overhuman_types::{OverhumanError, Result};

/// Opening anchor marker.
pub const ANCHOR_START: &str = "<!-- ANCHOR:START -->";
/// Closing anchor marker.
pub const ANCHOR_END: &str = "<!-- ANCHOR:END -->";

/// The template written by [`SoulManager::init`].
pub const DEFAULT_TEMPLATE: &str = "\
# Soul

<!-- ANCHOR:START -->
## Core principles

- Serve the operator's interests; never act against them.
- Prefer reversible actions; ask before destructive ones.
- Account honestly for cost, quality, and failure.
<!-- ANCHOR:END -->

## Strategy

Start every task from memory; prefer a proven skill over a fresh plan.

## Current state

Nothing learned yet.
";

/// Metadata stored next to each snapshot as `v{N}.meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Monotonically increasing version number.
    pub version: u64,
    /// Free-form reason for the write.
    pub reason: String,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// First 8 bytes of the SHA-256 of the content, hex-encoded.
    pub checksum: String,
}

/// Manages `soul.md` and its version history.
///
/// Writes take the exclusive lock; reads take the shared lock. The lock
/// also covers the snapshot directory so version numbering stays
/// monotonic under concurrent updates.
pub struct SoulManager {
    soul_path: PathBuf,
    versions_dir: PathBuf,
    lock: RwLock<()>,
}

impl SoulManager {
    /// Create a manager over the standard data-dir layout.
    pub fn new(data_dir: &DataDir) -> Self {
        Self {
            soul_path: data_dir.soul_path(),
            versions_dir: data_dir.versions_dir(),
            lock: RwLock::new(()),
        }
    }

    /// Initialize the document from [`DEFAULT_TEMPLATE`].
    ///
    /// # Errors
    ///
    /// [`OverhumanError::Conflict`] when a document already exists.
    pub async fn init(&self) -> Result<()> {
        self.init_with(DEFAULT_TEMPLATE).await
    }

    /// Initialize the document with explicit content.
    pub async fn init_with(&self, content: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        if tokio::fs::try_exists(&self.soul_path).await? {
            return Err(OverhumanError::conflict("soul already initialized"));
        }
        tokio::fs::create_dir_all(&self.versions_dir).await?;
        write_atomic(&self.soul_path, content).await?;
        self.write_snapshot(1, content, "initialized").await?;
        info!(path = %self.soul_path.display(), "soul initialized");
        Ok(())
    }

    /// Read the current document.
    pub async fn read(&self) -> Result<String> {
        let _guard = self.lock.read().await;
        self.read_current().await
    }

    /// Replace the document with `candidate`, enforcing the anchor
    /// invariant. Returns the new version number.
    ///
    /// # Errors
    ///
    /// - [`OverhumanError::NotFound`] when the document was never
    ///   initialized.
    /// - [`OverhumanError::AnchorViolation`] when the current document has
    ///   an anchor block and the candidate lacks one or changed its bytes.
    pub async fn update(&self, candidate: &str, reason: &str) -> Result<u64> {
        let _guard = self.lock.write().await;
        let current = self.read_current().await?;

        match extract_anchor(&current) {
            Some(current_anchor) => match extract_anchor(candidate) {
                Some(candidate_anchor) if candidate_anchor == current_anchor => {}
                Some(_) => {
                    return Err(OverhumanError::AnchorViolation {
                        reason: "anchor block differs from previous version".into(),
                    });
                }
                None => {
                    return Err(OverhumanError::AnchorViolation {
                        reason: "anchor block missing or markers out of order".into(),
                    });
                }
            },
            // First-time scenario: no anchor yet, any candidate accepted.
            None => {}
        }

        let version = self.next_version().await?;
        write_atomic(&self.soul_path, candidate).await?;
        self.write_snapshot(version, candidate, reason).await?;
        debug!(version, reason, "soul updated");
        Ok(version)
    }

    /// Restore snapshot `version` as the current document.
    ///
    /// Creates a fresh snapshot noting the rollback, so history is never
    /// rewritten. Returns the new version number.
    pub async fn rollback(&self, version: u64) -> Result<u64> {
        let _guard = self.lock.write().await;
        let content = self.read_snapshot_locked(version).await?;
        let new_version = self.next_version().await?;
        write_atomic(&self.soul_path, &content).await?;
        self.write_snapshot(new_version, &content, &format!("rollback to v{version}"))
            .await?;
        info!(from = version, to = new_version, "soul rolled back");
        Ok(new_version)
    }

    /// All snapshot version numbers, ascending.
    pub async fn versions(&self) -> Result<Vec<u64>> {
        let _guard = self.lock.read().await;
        self.list_versions().await
    }

    /// Read one snapshot's content.
    pub async fn snapshot(&self, version: u64) -> Result<String> {
        let _guard = self.lock.read().await;
        self.read_snapshot_locked(version).await
    }

    /// Read one snapshot's metadata.
    pub async fn snapshot_meta(&self, version: u64) -> Result<SnapshotMeta> {
        let _guard = self.lock.read().await;
        let path = self.versions_dir.join(format!("v{version}.meta"));
        if !tokio::fs::try_exists(&path).await? {
            return Err(OverhumanError::not_found(format!("soul version {version}")));
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn read_current(&self) -> Result<String> {
        if !tokio::fs::try_exists(&self.soul_path).await? {
            return Err(OverhumanError::not_found("soul document"));
        }
        Ok(tokio::fs::read_to_string(&self.soul_path).await?)
    }

    async fn read_snapshot_locked(&self, version: u64) -> Result<String> {
        let path = self.versions_dir.join(format!("v{version}.md"));
        if !tokio::fs::try_exists(&path).await? {
            return Err(OverhumanError::not_found(format!("soul version {version}")));
        }
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    async fn next_version(&self) -> Result<u64> {
        let versions = self.list_versions().await?;
        Ok(versions.last().copied().unwrap_or(0) + 1)
    }

    async fn list_versions(&self) -> Result<Vec<u64>> {
        if !tokio::fs::try_exists(&self.versions_dir).await? {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.versions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(num) = name.strip_prefix('v').and_then(|s| s.strip_suffix(".md"))
                && let Ok(v) = num.parse::<u64>()
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn write_snapshot(&self, version: u64, content: &str, reason: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.versions_dir).await?;
        let meta = SnapshotMeta {
            version,
            reason: reason.to_string(),
            timestamp: Utc::now(),
            checksum: checksum(content),
        };
        tokio::fs::write(
            self.versions_dir.join(format!("v{version}.md")),
            content,
        )
        .await?;
        tokio::fs::write(
            self.versions_dir.join(format!("v{version}.meta")),
            serde_json::to_string_pretty(&meta)?,
        )
        .await?;
        Ok(())
    }
}

/// The byte range between the anchor markers, or `None` when the markers
/// are absent or out of order.
pub fn extract_anchor(text: &str) -> Option<&str> {
    let start = text.find(ANCHOR_START)?;
    let body_start = start + ANCHOR_START.len();
    let end_rel = text[body_start..].find(ANCHOR_END)?;
    Some(&text[body_start..body_start + end_rel])
}

/// First 8 bytes of the SHA-256 of `content`, hex-encoded.
fn checksum(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Write a file atomically via a temp sibling and rename, then set mode
/// 644 on unix.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("md.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> SoulManager {
        SoulManager::new(&DataDir::at(dir))
    }

    #[tokio::test]
    async fn init_writes_template_and_first_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();

        let current = soul.read().await.unwrap();
        assert_eq!(current, DEFAULT_TEMPLATE);
        assert_eq!(soul.versions().await.unwrap(), vec![1]);

        let meta = soul.snapshot_meta(1).await.unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.reason, "initialized");
        assert_eq!(meta.checksum.len(), 16);
    }

    #[tokio::test]
    async fn init_twice_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();
        let err = soul.init().await.unwrap_err();
        assert!(matches!(err, OverhumanError::Conflict { .. }));
    }

    #[tokio::test]
    async fn read_before_init_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        let err = soul.read().await.unwrap_err();
        assert!(matches!(err, OverhumanError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_with_unchanged_anchor_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();

        let candidate = DEFAULT_TEMPLATE.replace(
            "Nothing learned yet.",
            "Learned: batch similar requests.",
        );
        let version = soul.update(&candidate, "state update").await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(soul.read().await.unwrap(), candidate);
        assert_eq!(soul.versions().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn update_changing_anchor_byte_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();

        // One character changed inside the anchor block.
        let candidate = DEFAULT_TEMPLATE.replace("never act against", "never act Against");
        let err = soul.update(&candidate, "sneaky edit").await.unwrap_err();
        assert!(matches!(err, OverhumanError::AnchorViolation { .. }));

        // Stored document is untouched and no snapshot was added.
        assert_eq!(soul.read().await.unwrap(), DEFAULT_TEMPLATE);
        assert_eq!(soul.versions().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn update_dropping_markers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();

        let candidate = DEFAULT_TEMPLATE.replace(ANCHOR_END, "");
        let err = soul.update(&candidate, "dropped marker").await.unwrap_err();
        assert!(matches!(err, OverhumanError::AnchorViolation { .. }));
    }

    #[tokio::test]
    async fn first_time_document_without_anchor_accepts_any_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init_with("# Bare soul, no anchor\n").await.unwrap();

        let version = soul
            .update(DEFAULT_TEMPLATE, "adopt anchored template")
            .await
            .unwrap();
        assert_eq!(version, 2);

        // From now on the anchor is locked in.
        let bad = DEFAULT_TEMPLATE.replace("Core principles", "Core directives");
        assert!(soul.update(&bad, "mutate anchor").await.is_err());
    }

    #[tokio::test]
    async fn rollback_restores_bytes_and_appends_history() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();

        let v2 = DEFAULT_TEMPLATE.replace("Nothing learned yet.", "state A");
        let v3 = DEFAULT_TEMPLATE.replace("Nothing learned yet.", "state B");
        soul.update(&v2, "a").await.unwrap();
        soul.update(&v3, "b").await.unwrap();

        let new_version = soul.rollback(2).await.unwrap();
        assert_eq!(new_version, 4);
        assert_eq!(soul.read().await.unwrap(), v2);
        assert_eq!(soul.versions().await.unwrap(), vec![1, 2, 3, 4]);

        let meta = soul.snapshot_meta(4).await.unwrap();
        assert_eq!(meta.reason, "rollback to v2");
        // Byte-equal content yields byte-equal checksum.
        assert_eq!(meta.checksum, soul.snapshot_meta(2).await.unwrap().checksum);
    }

    #[tokio::test]
    async fn rollback_to_missing_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();
        let err = soul.rollback(9).await.unwrap_err();
        assert!(matches!(err, OverhumanError::NotFound { .. }));
    }

    #[tokio::test]
    async fn snapshot_content_matches_version() {
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();
        let v2 = DEFAULT_TEMPLATE.replace("Nothing learned yet.", "second");
        soul.update(&v2, "x").await.unwrap();

        assert_eq!(soul.snapshot(1).await.unwrap(), DEFAULT_TEMPLATE);
        assert_eq!(soul.snapshot(2).await.unwrap(), v2);
    }

    #[test]
    fn extract_anchor_requires_ordered_markers() {
        let ok = format!("a {ANCHOR_START}core{ANCHOR_END} b");
        assert_eq!(extract_anchor(&ok), Some("core"));

        let reversed = format!("a {ANCHOR_END}core{ANCHOR_START} b");
        assert_eq!(extract_anchor(&reversed), None);

        assert_eq!(extract_anchor("no markers at all"), None);
        assert_eq!(extract_anchor(ANCHOR_START), None);
    }

    #[test]
    fn checksum_is_first_eight_bytes_hex() {
        let c = checksum("hello");
        assert_eq!(c.len(), 16);
        // SHA-256("hello") starts with 2cf24dba5fb0a30e.
        assert_eq!(c, "2cf24dba5fb0a30e");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn soul_file_is_mode_644() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let soul = manager(dir.path());
        soul.init().await.unwrap();
        let mode = std::fs::metadata(dir.path().join("soul.md"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
