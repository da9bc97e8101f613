//! Configuration schema and the on-disk state layout.
//!
//! Configuration lives in `~/.overhuman/config.json` (mode 600). Environment
//! variables override file values: `LLM_PROVIDER`, `LLM_MODEL`,
//! `LLM_BASE_URL`, `LLM_API_KEY`, `OVERHUMAN_NAME`, `OVERHUMAN_API_ADDR`,
//! `OVERHUMAN_DATA_DIR`, and `{PROVIDER}_API_KEY` (e.g. `ANTHROPIC_API_KEY`).
//! Unknown JSON fields are silently ignored for forward compatibility.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OverhumanError, Result};

fn default_provider() -> String {
    "anthropic".into()
}

fn default_model() -> String {
    "claude-sonnet-4-5".into()
}

fn default_name() -> String {
    "overhuman".into()
}

fn default_api_addr() -> String {
    "127.0.0.1:9090".into()
}

fn default_heartbeat_minutes() -> u64 {
    30
}

fn default_automation_threshold() -> u64 {
    3
}

fn default_macro_threshold() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    256
}

fn default_short_term_capacity() -> usize {
    50
}

fn default_file_watch_interval_secs() -> u64 {
    5
}

/// Root configuration, mirroring `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active LLM provider name ("anthropic" or any chat-completions host).
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the active provider. Usually supplied via environment.
    #[serde(default)]
    pub api_key: String,

    /// Default model id.
    #[serde(default = "default_model")]
    pub model: String,

    /// Provider base URL override; empty means the provider default.
    #[serde(default)]
    pub base_url: String,

    /// Agent name used in SKB entries and logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Listen address for the HTTP ingestion API.
    #[serde(default = "default_api_addr")]
    pub api_addr: String,

    /// Daemon tunables.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// File watcher settings; absent means the watcher is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
            base_url: String::new(),
            name: default_name(),
            api_addr: default_api_addr(),
            daemon: DaemonConfig::default(),
            watch: None,
        }
    }
}

/// Daemon-level tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minutes between heartbeat inputs.
    #[serde(default = "default_heartbeat_minutes")]
    pub heartbeat_minutes: u64,

    /// Pattern observations needed before automation triggers.
    #[serde(default = "default_automation_threshold")]
    pub automation_threshold: u64,

    /// Meso runs accumulated before a macro reflection becomes eligible.
    #[serde(default = "default_macro_threshold")]
    pub macro_threshold: u64,

    /// Bounded input queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Short-term memory ring capacity.
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_minutes: default_heartbeat_minutes(),
            automation_threshold: default_automation_threshold(),
            macro_threshold: default_macro_threshold(),
            queue_capacity: default_queue_capacity(),
            short_term_capacity: default_short_term_capacity(),
        }
    }
}

/// File watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory to poll.
    pub dir: String,

    /// Poll interval in seconds.
    #[serde(default = "default_file_watch_interval_secs")]
    pub interval_secs: u64,

    /// Whether to descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,

    /// Only emit files with these extensions; empty means all.
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Config {
    /// Load configuration from a file, then apply environment overrides.
    ///
    /// A missing file yields the defaults (still subject to overrides), so
    /// a fresh install can run entirely from environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(&collect_env());
        Ok(config)
    }

    /// Write configuration as pretty JSON, mode 600 on unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Apply overrides from an environment snapshot.
    ///
    /// Precedence within the key family: `LLM_API_KEY` wins over
    /// `{PROVIDER}_API_KEY`, which wins over the file value.
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(v) = env.get("LLM_PROVIDER") {
            self.provider = v.clone();
        }
        if let Some(v) = env.get("LLM_MODEL") {
            self.model = v.clone();
        }
        if let Some(v) = env.get("LLM_BASE_URL") {
            self.base_url = v.clone();
        }

        let provider_key = format!("{}_API_KEY", self.provider.to_uppercase().replace('-', "_"));
        if let Some(v) = env.get(&provider_key) {
            self.api_key = v.clone();
        }
        if let Some(v) = env.get("LLM_API_KEY") {
            self.api_key = v.clone();
        }

        if let Some(v) = env.get("OVERHUMAN_NAME") {
            self.name = v.clone();
        }
        if let Some(v) = env.get("OVERHUMAN_API_ADDR") {
            self.api_addr = v.clone();
        }
    }
}

fn collect_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// The persistent state directory layout.
///
/// Everything the daemon writes lives under one root (default
/// `~/.overhuman`, overridable via `OVERHUMAN_DATA_DIR`).
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from the environment or the home
    /// directory default.
    ///
    /// # Errors
    ///
    /// Fails when no home directory can be determined and no override is
    /// set.
    pub fn resolve() -> Result<Self> {
        if let Ok(dir) = std::env::var("OVERHUMAN_DATA_DIR") {
            return Ok(Self { root: dir.into() });
        }
        let home = dirs::home_dir().ok_or_else(|| {
            OverhumanError::invalid_input("could not determine home directory")
        })?;
        Ok(Self {
            root: home.join(".overhuman"),
        })
    }

    /// A data dir rooted at an explicit path (tests, containers).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and the soul-versions directory.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.versions_dir())?;
        Ok(())
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `config.json`.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// `overhuman.db`.
    pub fn db_path(&self) -> PathBuf {
        self.root.join("overhuman.db")
    }

    /// `soul.md`.
    pub fn soul_path(&self) -> PathBuf {
        self.root.join("soul.md")
    }

    /// `soul_versions/`.
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("soul_versions")
    }

    /// `overhuman.pid`.
    pub fn pid_path(&self) -> PathBuf {
        self.root.join("overhuman.pid")
    }
}
