//! Size-based rotation of the daemon's log files.
//!
//! `daemon.log` becomes `daemon.log.1`, `.1` becomes `.2`, and so on; the
//! copy past [`RotationPolicy::keep`] is deleted. The daemon's file writer
//! reopens the live path on every write, so nothing needs to be signalled
//! after a rotation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How often the daemon checks log sizes.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size at which the live file is rotated.
    pub max_bytes: u64,
    /// Rotated copies kept next to the live file.
    pub keep: usize,
}

impl Default for RotationPolicy {
    /// 10 MiB, five copies.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log` if it has reached `max_bytes`. A missing file is not an
    /// error. Returns whether a rotation happened.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.keep == 0 {
            return Ok(false);
        }

        remove_if_present(&copy_path(log, self.keep))?;
        for n in (1..self.keep).rev() {
            let from = copy_path(log, n);
            if from.exists() {
                fs::rename(&from, copy_path(log, n + 1))?;
            }
        }
        fs::rename(log, copy_path(log, 1))?;
        fs::File::create(log)?;
        Ok(true)
    }
}

/// Rotate `daemon.log` and `daemon-err.log` under `home`.
///
/// Failures are logged; one file failing does not block the other.
pub fn rotate_logs(home: &Path, policy: RotationPolicy) {
    let logs = [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ];
    for log in &logs {
        match policy.rotate(log) {
            Ok(true) => tracing::info!(path = %log.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %log.display(), error = %err, "log rotation failed"),
        }
    }
}

fn copy_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 16,
        keep: 3,
    };

    #[test]
    fn small_or_missing_files_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        assert!(!SMALL.rotate(&log).unwrap());

        fs::write(&log, "short").unwrap();
        assert!(!SMALL.rotate(&log).unwrap());
        assert!(!copy_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_moves_to_first_copy() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "x".repeat(32)).unwrap();

        assert!(SMALL.rotate(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read_to_string(copy_path(&log, 1)).unwrap(), "x".repeat(32));
    }

    #[test]
    fn copies_shift_and_oldest_is_dropped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");

        for round in 1..=5 {
            fs::write(&log, format!("round-{round}-{}", "x".repeat(16))).unwrap();
            SMALL.rotate(&log).unwrap();
        }

        assert!(fs::read_to_string(copy_path(&log, 1)).unwrap().starts_with("round-5"));
        assert!(fs::read_to_string(copy_path(&log, 3)).unwrap().starts_with("round-3"));
        assert!(!copy_path(&log, 4).exists());
    }

    #[test]
    fn copy_names_extend_the_file_name() {
        let log = Path::new("/tmp/logs/daemon-err.log");
        assert_eq!(copy_path(log, 2), Path::new("/tmp/logs/daemon-err.log.2"));
    }

    #[test]
    fn default_policy_is_ten_mib_five_copies() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.keep, 5);
    }
}
