//! Per-vault sync lock shared by the CLI and the daemon.
//!
//! The lock is a file created with `create_new`, holding the owner's pid and
//! start time as JSON. A guard removes the file on drop only while the file
//! still records that guard as owner.
//!
//! An existing lock is taken over when its recorded pid is no longer alive.
//! A lock whose metadata cannot be read (or, off Unix, whose owner cannot be
//! probed) falls back to its age against [`STALE_LOCK_AGE`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use vaultsync_core::VaultName;

use crate::error::{sync_io_err, SyncError};

/// Age after which a lock with unknown ownership is considered abandoned.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub started_at_ms: i64,
}

/// Guard for an in-flight sync of one vault.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
    meta: LockMeta,
}

impl SyncLock {
    /// Take the lock at `path`, or fail with [`SyncError::InProgress`].
    pub fn acquire(path: &Path, vault: &VaultName) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| sync_io_err(parent, e))?;
        }

        let meta = LockMeta {
            pid: std::process::id(),
            started_at_ms: Utc::now().timestamp_millis(),
        };

        let mut file = match open_new(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let observed = read_lock_meta(path);
                // Re-read so a contender that already took over is not evicted.
                if !is_stale(path, observed.as_ref()) || read_lock_meta(path) != observed {
                    return Err(SyncError::InProgress {
                        vault: vault.to_string(),
                    });
                }
                tracing::warn!(
                    "removing stale sync lock for vault '{vault}' at {}",
                    path.display()
                );
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(sync_io_err(path, e)),
                }
                // Another process may have taken over in between.
                open_new(path).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        SyncError::InProgress {
                            vault: vault.to_string(),
                        }
                    } else {
                        sync_io_err(path, e)
                    }
                })?
            }
            Err(err) => return Err(sync_io_err(path, err)),
        };

        let body = serde_json::to_vec(&meta).map_err(|e| sync_io_err(path, e.into()))?;
        file.write_all(&body).map_err(|e| sync_io_err(path, e))?;

        tracing::debug!("acquired sync lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if read_lock_meta(&self.path).as_ref() != Some(&self.meta) {
            tracing::warn!(
                "sync lock {} is no longer ours, leaving it in place",
                self.path.display()
            );
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release sync lock {}: {e}", self.path.display());
        }
    }
}

/// Read the metadata of a held lock, if any.
pub fn read_lock_meta(path: &Path) -> Option<LockMeta> {
    let body = fs::read(path).ok()?;
    serde_json::from_slice(&body).ok()
}

fn open_new(path: &Path) -> io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn is_stale(path: &Path, meta: Option<&LockMeta>) -> bool {
    if let Some(alive) = meta.and_then(|meta| owner_alive(meta.pid)) {
        return !alive;
    }
    older_than_stale_age(path)
}

/// Whether `pid` is a live process; `None` when that cannot be determined.
#[cfg(unix)]
fn owner_alive(pid: u32) -> Option<bool> {
    let pid = libc::pid_t::try_from(pid).ok().filter(|pid| *pid > 0)?;
    // SAFETY: signal 0 performs the permission and existence checks only.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return Some(true);
    }
    Some(io::Error::last_os_error().raw_os_error() == Some(libc::EPERM))
}

#[cfg(not(unix))]
fn owner_alive(_pid: u32) -> Option<bool> {
    None
}

fn older_than_stale_age(path: &Path) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        // Vanished between the failed create and now: let the retry decide.
        Err(_) => return true,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn vault() -> VaultName {
        VaultName::from("Notes")
    }

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/Notes.lock");

        let first = SyncLock::acquire(&path, &vault()).expect("first");
        let err = SyncLock::acquire(&path, &vault()).unwrap_err();
        assert!(matches!(err, SyncError::InProgress { ref vault } if vault == "Notes"));
        assert_eq!(
            err.to_string(),
            "sync already in progress for vault 'Notes'"
        );
        drop(first);
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");

        {
            let _lock = SyncLock::acquire(&path, &vault()).expect("acquire");
            assert!(path.exists());
        }
        assert!(!path.exists());
        SyncLock::acquire(&path, &vault()).expect("reacquire");
    }

    #[test]
    fn lock_file_records_owner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");
        let lock = SyncLock::acquire(&path, &vault()).expect("acquire");

        let meta = read_lock_meta(&path).expect("meta");
        assert_eq!(meta.pid, std::process::id());
        assert_eq!(&meta, lock.meta());
    }

    fn backdate(path: &Path, by: Duration) {
        let then = SystemTime::now() - by;
        filetime::set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
    }

    /// Pid of a process that has already exited.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn lock_of_exited_owner_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");
        let body = format!("{{\"pid\":{},\"started_at_ms\":0}}", dead_pid());
        fs::write(&path, body).unwrap();

        let lock = SyncLock::acquire(&path, &vault()).expect("takeover");
        assert_eq!(lock.meta().pid, std::process::id());
        assert_eq!(read_lock_meta(&path).as_ref(), Some(lock.meta()));
    }

    #[test]
    fn old_lock_of_live_owner_is_respected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");

        let _held = SyncLock::acquire(&path, &vault()).expect("first");
        backdate(&path, 2 * STALE_LOCK_AGE);

        assert!(matches!(
            SyncLock::acquire(&path, &vault()),
            Err(SyncError::InProgress { .. })
        ));
        assert!(path.exists());
    }

    #[test]
    fn unreadable_lock_falls_back_to_age() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");
        fs::write(&path, b"").unwrap();

        assert!(matches!(
            SyncLock::acquire(&path, &vault()),
            Err(SyncError::InProgress { .. })
        ));

        backdate(&path, 2 * STALE_LOCK_AGE);
        SyncLock::acquire(&path, &vault()).expect("takeover");
    }

    #[test]
    fn dropping_a_superseded_guard_keeps_the_new_owners_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");

        let old = SyncLock::acquire(&path, &vault()).expect("first");
        let successor = LockMeta {
            pid: old.meta().pid,
            started_at_ms: old.meta().started_at_ms + 1,
        };
        fs::write(&path, serde_json::to_vec(&successor).unwrap()).unwrap();

        drop(old);
        assert!(path.exists());
        assert_eq!(read_lock_meta(&path), Some(successor));
        assert!(matches!(
            SyncLock::acquire(&path, &vault()),
            Err(SyncError::InProgress { .. })
        ));
    }

    #[test]
    fn fresh_foreign_lock_is_respected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.lock");
        fs::write(&path, b"{\"pid\":1,\"started_at_ms\":0}").unwrap();

        assert!(matches!(
            SyncLock::acquire(&path, &vault()),
            Err(SyncError::InProgress { .. })
        ));
        assert!(path.exists());
    }
}
