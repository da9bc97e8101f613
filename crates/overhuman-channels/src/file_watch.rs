//! The file-directory poller.
//!
//! Polls a directory on a fixed interval (default 5 s), optionally
//! recursively and filtered by extension. The first scan seeds the known
//! set without emitting anything; later scans emit one input per new file
//! or changed mtime, with the file contents as payload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use overhuman_types::config::WatchConfig;
use overhuman_types::input::{InputMeta, InputSource, NormalizedInput};

use crate::traits::{ChannelAdapter, ChannelError, Result};

/// Channel name used for file-originated inputs.
pub const FILE_CHANNEL: &str = "file";

/// Polling directory watcher.
pub struct FileWatchAdapter {
    config: WatchConfig,
}

impl FileWatchAdapter {
    /// Create the adapter from watcher settings.
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// One scan pass: returns `(path, mtime)` for every candidate file.
    fn scan(&self) -> std::io::Result<Vec<(PathBuf, SystemTime)>> {
        let mut found = Vec::new();
        let mut stack = vec![PathBuf::from(&self.config.dir)];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if dir == Path::new(&self.config.dir) => return Err(e),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable subdirectory");
                    continue;
                }
            };
            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                let meta = entry.metadata()?;
                if meta.is_dir() {
                    if self.config.recursive {
                        stack.push(path);
                    }
                    continue;
                }
                if !self.extension_allowed(&path) {
                    continue;
                }
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                found.push((path, mtime));
            }
        }
        Ok(found)
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    fn input_for(path: &Path, contents: String) -> NormalizedInput {
        let mut meta = InputMeta::for_channel(FILE_CHANNEL);
        meta.url = Some(path.display().to_string());
        NormalizedInput::new(InputSource::File, meta, contents)
    }
}

#[async_trait]
impl ChannelAdapter for FileWatchAdapter {
    fn name(&self) -> &str {
        "file"
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<NormalizedInput>,
    ) -> Result<()> {
        let mut known: HashMap<PathBuf, SystemTime> = HashMap::new();

        // Seed pass: existing files are known state, not events.
        for (path, mtime) in self.scan()? {
            known.insert(path, mtime);
        }
        debug!(
            dir = %self.config.dir,
            seeded = known.len(),
            interval_secs = self.config.interval_secs,
            "file watcher seeded"
        );

        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            for (path, mtime) in self.scan()? {
                let changed = match known.get(&path) {
                    None => true,
                    Some(prior) => *prior != mtime,
                };
                if !changed {
                    continue;
                }
                known.insert(path.clone(), mtime);
                let contents = match std::fs::read_to_string(&path) {
                    Ok(contents) => contents,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "unreadable file skipped");
                        continue;
                    }
                };
                debug!(path = %path.display(), "file event");
                out.send(Self::input_for(&path, contents))
                    .await
                    .map_err(|_| ChannelError::QueueClosed)?;
            }
        }
    }

    async fn send(&self, _target: &str, _message: &str) -> Result<()> {
        // Files are input-only; replies have nowhere to go.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(dir: &Path, extensions: Vec<String>, recursive: bool) -> WatchConfig {
        WatchConfig {
            dir: dir.display().to_string(),
            interval_secs: 1,
            recursive,
            extensions,
        }
    }

    /// Run the watcher until `expected` events arrive or 5 s pass.
    async fn collect_events(
        adapter: FileWatchAdapter,
        expected: usize,
        act: impl FnOnce() + Send + 'static,
    ) -> Vec<NormalizedInput> {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { adapter.start(run_cancel, tx).await });

        // Give the seed pass a moment, then mutate the directory.
        tokio::time::sleep(Duration::from_millis(100)).await;
        act();

        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while events.len() < expected {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(input)) => events.push(input),
                _ => break,
            }
        }
        cancel.cancel();
        let _ = handle.await;
        events
    }

    #[tokio::test]
    async fn seed_scan_emits_nothing_for_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.txt"), "old news").unwrap();

        let adapter = FileWatchAdapter::new(config(dir.path(), vec![], false));
        let events = collect_events(adapter, 1, || {}).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn new_file_emits_event_with_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");

        let adapter = FileWatchAdapter::new(config(dir.path(), vec![], false));
        let events = collect_events(adapter, 1, move || {
            std::fs::write(&path, "summarize this note").unwrap();
        })
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, InputSource::File);
        assert_eq!(events[0].payload, "summarize this note");
        assert!(events[0].meta.url.as_deref().unwrap().ends_with("note.txt"));
    }

    #[tokio::test]
    async fn extension_filter_applies() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("task.md");
        let skip = dir.path().join("image.bin");

        let adapter = FileWatchAdapter::new(config(dir.path(), vec!["md".into()], false));
        let events = collect_events(adapter, 2, move || {
            std::fs::write(&keep, "# todo").unwrap();
            std::fs::write(&skip, "junk").unwrap();
        })
        .await;

        assert_eq!(events.len(), 1);
        assert!(events[0].meta.url.as_deref().unwrap().ends_with("task.md"));
    }

    #[tokio::test]
    async fn recursive_scan_descends() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("deep");
        std::fs::create_dir(&sub).unwrap();
        let nested = sub.join("inner.txt");

        let adapter = FileWatchAdapter::new(config(dir.path(), vec![], true));
        let events = collect_events(adapter, 1, move || {
            std::fs::write(&nested, "nested payload").unwrap();
        })
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, "nested payload");
    }

    #[tokio::test]
    async fn non_recursive_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("deep");
        std::fs::create_dir(&sub).unwrap();
        let nested = sub.join("inner.txt");

        let adapter = FileWatchAdapter::new(config(dir.path(), vec![], false));
        let events = collect_events(adapter, 1, move || {
            std::fs::write(&nested, "hidden").unwrap();
        })
        .await;
        assert!(events.is_empty());
    }

    #[test]
    fn extension_matching_ignores_case_and_dots() {
        let dir = tempfile::tempdir().unwrap();
        let adapter =
            FileWatchAdapter::new(config(dir.path(), vec![".MD".into(), "txt".into()], false));
        assert!(adapter.extension_allowed(Path::new("a.md")));
        assert!(adapter.extension_allowed(Path::new("b.TXT")));
        assert!(!adapter.extension_allowed(Path::new("c.rs")));
        assert!(!adapter.extension_allowed(Path::new("no_extension")));
    }
}
