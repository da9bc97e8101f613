//! Single-instance guard via `overhuman.pid`.
//!
//! The file holds one decimal pid. On acquire, a parseable pid that is
//! still alive (signal-0 probe) means another daemon owns the data
//! directory; stale entries are silently removed. The guard deletes the
//! file on drop.

use std::path::PathBuf;

use tracing::{debug, warn};

use overhuman_types::{OverhumanError, Result};

/// Holds the pid file for the lifetime of the daemon.
#[derive(Debug)]
pub struct PidGuard {
    path: PathBuf,
}

impl PidGuard {
    /// Acquire the guard, failing when a live daemon already holds it.
    pub fn acquire(path: PathBuf) -> Result<Self> {
        if let Ok(raw) = std::fs::read_to_string(&path) {
            match raw.trim().parse::<u32>() {
                Ok(pid) if pid_alive(pid) => {
                    return Err(OverhumanError::conflict(format!(
                        "daemon already running (pid {pid})"
                    )));
                }
                Ok(pid) => {
                    debug!(pid, "removing stale pid file");
                    let _ = std::fs::remove_file(&path);
                }
                Err(_) => {
                    warn!(path = %path.display(), "unparseable pid file replaced");
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, format!("{}\n", std::process::id()))?;
        Ok(Self { path })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Signal-0 liveness probe.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence without sending a signal; EPERM
    // still means the process exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Without signal-0, trust only our own pid namespace check.
#[cfg(not(unix))]
fn pid_alive(pid: u32) -> bool {
    pid == std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid_and_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overhuman.pid");

        {
            let _guard = PidGuard::acquire(path.clone()).unwrap();
            let raw = std::fs::read_to_string(&path).unwrap();
            assert_eq!(raw.trim().parse::<u32>().unwrap(), std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn live_pid_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overhuman.pid");
        // Our own pid is certainly alive.
        std::fs::write(&path, format!("{}", std::process::id())).unwrap();

        let err = PidGuard::acquire(path).unwrap_err();
        assert!(matches!(err, OverhumanError::Conflict { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn stale_pid_is_silently_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overhuman.pid");
        // Pids near the u32 ceiling are far beyond any real pid table.
        std::fs::write(&path, "4294967294").unwrap();

        let _guard = PidGuard::acquire(path.clone()).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn garbage_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overhuman.pid");
        std::fs::write(&path, "not a pid").unwrap();

        let _guard = PidGuard::acquire(path.clone()).unwrap();
        assert!(path.exists());
    }
}
