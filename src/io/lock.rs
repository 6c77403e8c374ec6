//! Lock file management for single-instance enforcement.
//!
//! The lock file holds the daemon's PID and the configuration file it runs
//! with. A lock left behind by a dead process is removed and taken over.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Held lock; released when dropped or through [`InstanceLock::release`].
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock and remove the lock file.
    pub fn release(self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Default lock file location.
pub fn lock_path() -> PathBuf {
    super::runtime_dir().join("lumaflow.lock")
}

/// Acquire the instance lock at `lock_path`.
///
/// Fails when another live process holds it.
pub fn acquire_lock(lock_path: &Path, config_path: &Path) -> Result<InstanceLock> {
    if let Some(lock) = try_lock(lock_path, config_path)? {
        return Ok(lock);
    }

    clear_stale_lock(lock_path)?;

    try_lock(lock_path, config_path)?.ok_or_else(|| {
        anyhow::anyhow!(
            "Failed to acquire lock {} after removing a stale lock",
            lock_path.display()
        )
    })
}

fn try_lock(lock_path: &Path, config_path: &Path) -> Result<Option<InstanceLock>> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Do not truncate: the content belongs to the current holder until we lock
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    writeln!(file, "{}", config_path.display())?;
    file.flush()?;

    Ok(Some(InstanceLock {
        file,
        path: lock_path.to_path_buf(),
    }))
}

/// PID recorded in a lock file, if it has one.
pub fn read_lock_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Remove a lock whose owner is gone, or fail if the owner is alive.
fn clear_stale_lock(lock_path: &Path) -> Result<()> {
    match read_lock_pid(lock_path) {
        Some(pid) if pid != std::process::id() && is_process_running(pid) => {
            anyhow::bail!("lumaflow is already running (PID: {pid})");
        }
        Some(pid) => {
            log_warning!("Removing stale lock file (process {pid} no longer running)");
        }
        None => {
            log_warning!("Lock file format invalid, removing");
        }
    }

    let _ = std::fs::remove_file(lock_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumaflow.lock");

        let lock = acquire_lock(&path, Path::new("/etc/lumaflow.toml")).unwrap();
        assert_eq!(read_lock_pid(&path), Some(std::process::id()));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("/etc/lumaflow.toml"));

        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumaflow.lock");
        // No process holds the lock; the recorded PID is irrelevant
        std::fs::write(&path, "4194304\n/tmp/old.toml\n").unwrap();

        let lock = acquire_lock(&path, Path::new("/tmp/new.toml")).unwrap();
        assert_eq!(read_lock_pid(lock.path()), Some(std::process::id()));
        lock.release();
    }
}
