//! Single-instance lock and PID file for the HTTP server.
//!
//! The lock is an exclusive-create file containing the owner's PID. A lock
//! older than 30 seconds is presumed to belong to a dead server and is
//! stolen; the live server refreshes its lock's mtime every 10 seconds to
//! stay inside the window.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Locks untouched for this long are presumed stale.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// How often the running server refreshes the lock.
pub const LOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock, stealing a stale one. Contention with a live
    /// instance is fatal.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        match Self::try_create(path) {
            Ok(()) => {}
            Err(_) => {
                let age = std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.elapsed().ok());

                match age {
                    Some(age) if age > LOCK_STALE_AFTER => {
                        tracing::warn!(
                            lock = %path.display(),
                            age_secs = age.as_secs(),
                            "stealing stale instance lock"
                        );
                        std::fs::remove_file(path).ok();
                        Self::try_create(path).with_context(|| {
                            format!("failed to acquire lock at {}", path.display())
                        })?;
                    }
                    _ => {
                        let holder = std::fs::read_to_string(path).unwrap_or_default();
                        bail!(
                            "another oracle-http instance appears to be running \
                             (lock {} held by pid {})",
                            path.display(),
                            holder.trim()
                        );
                    }
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn try_create(path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", std::process::id())?;
        Ok(())
    }

    /// Bump the lock's mtime so it stays inside the staleness window.
    pub fn refresh(&self) {
        if let Err(e) = std::fs::write(&self.path, std::process::id().to_string()) {
            tracing::warn!(error = %e, "failed to refresh instance lock");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "failed to remove instance lock");
            }
        }
    }
}

#[derive(Serialize)]
struct PidFileContents {
    pid: u32,
    port: u16,
    #[serde(rename = "startedAt")]
    started_at: String,
    name: &'static str,
}

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write `<data_dir>/oracle-http.pid` with pid, port, and start time.
    pub fn write(path: &Path, port: u16) -> Result<Self> {
        let contents = PidFileContents {
            pid: std::process::id(),
            port,
            started_at: Utc::now().to_rfc3339(),
            name: "oracle-http",
        };
        std::fs::write(path, serde_json::to_string_pretty(&contents)?)
            .with_context(|| format!("failed to write pid file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "failed to remove pid file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_live() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.lock");

        let _first = InstanceLock::acquire(&path).unwrap();
        let second = InstanceLock::acquire(&path);
        assert!(second.is_err());
        assert!(second
            .unwrap_err()
            .to_string()
            .contains("another oracle-http instance"));
    }

    #[test]
    fn drop_releases_the_lock() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.lock");

        {
            let _lock = InstanceLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        // Re-acquire after release
        let _again = InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn stale_lock_is_stolen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.lock");

        std::fs::write(&path, "99999").unwrap();
        // Age the file past the staleness window
        let stale = filetime_past(&path);
        assert!(stale, "could not age the lock file");

        let lock = InstanceLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents, std::process::id().to_string());
    }

    /// Age a file's mtime by rewriting its timestamps via the filesystem.
    /// Returns false if the platform call fails.
    fn filetime_past(path: &Path) -> bool {
        // utime is not exposed by std; shell out to `touch -d`.
        std::process::Command::new("touch")
            .arg("-d")
            .arg("2000-01-01T00:00:00")
            .arg(path)
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn pid_file_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.pid");

        {
            let _pid = PidFile::write(&path, 47778).unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["port"], 47778);
            assert_eq!(value["name"], "oracle-http");
            assert_eq!(value["pid"], std::process::id());
        }
        assert!(!path.exists());
    }
}
