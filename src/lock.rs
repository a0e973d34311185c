//! Named single-instance locks
//!
//! A lock is a file created atomically with `create_new`; whoever creates
//! it holds the lock until the guard is dropped. Locks left behind by a
//! crashed holder are evicted once they are older than the stale threshold
//! and the process stamped in them is no longer running.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{Result, UpdateError};

/// A process-wide exclusive lock identified by name
#[derive(Debug, Clone)]
pub struct NamedLock {
    path: PathBuf,
}

impl NamedLock {
    /// Lock `name` inside `dir`. Path separators in `name` are replaced.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        let safe: String = name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                other => other,
            })
            .collect();
        Self {
            path: dir.as_ref().join(format!("{safe}.lock")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock without waiting
    ///
    /// `Ok(None)` means another holder has it.
    pub fn try_acquire(&self, stale_after: Duration) -> Result<Option<LockGuard>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Lock(format!(
                    "failed to create lock directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        for attempt in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    if let Err(e) = write!(file, "{}", std::process::id()) {
                        tracing::debug!(
                            path = %self.path.display(),
                            "Failed to stamp lock holder: {}",
                            e
                        );
                    }
                    tracing::debug!(path = %self.path.display(), "Lock acquired");
                    return Ok(Some(LockGuard {
                        path: self.path.clone(),
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && self.evict_stale(stale_after) {
                        continue;
                    }
                    tracing::debug!(path = %self.path.display(), "Lock held elsewhere");
                    return Ok(None);
                }
                Err(e) => {
                    return Err(UpdateError::Lock(format!(
                        "failed to create lock {}: {e}",
                        self.path.display()
                    )));
                }
            }
        }
        Ok(None)
    }

    fn evict_stale(&self, stale_after: Duration) -> bool {
        let age = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());

        match age {
            Some(age) if age > stale_after => {
                let holder = std::fs::read_to_string(&self.path).unwrap_or_default();
                if holder_alive(holder.trim()) {
                    tracing::debug!(
                        path = %self.path.display(),
                        holder = holder.trim(),
                        age_secs = age.as_secs(),
                        "Lock is old but its holder is still running"
                    );
                    return false;
                }
                tracing::warn!(
                    path = %self.path.display(),
                    holder = holder.trim(),
                    age_secs = age.as_secs(),
                    "Evicting stale lock"
                );
                std::fs::remove_file(&self.path).is_ok()
            }
            _ => false,
        }
    }
}

/// Whether the pid stamped in a lock file belongs to a running process
///
/// An unreadable stamp counts as dead. Off Unix liveness is unknown and only
/// the lock age decides.
#[cfg(unix)]
fn holder_alive(stamp: &str) -> bool {
    match stamp.parse::<libc::pid_t>() {
        Ok(pid) if pid > 0 => {
            // Signal 0 only checks that the process exists.
            let rc = unsafe { libc::kill(pid, 0) };
            rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
        }
        _ => false,
    }
}

#[cfg(not(unix))]
fn holder_alive(_stamp: &str) -> bool {
    false
}

/// Releases the lock on drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Lock released"),
            Err(e) => tracing::warn!(path = %self.path.display(), "Failed to release lock: {}", e),
        }
    }
}
