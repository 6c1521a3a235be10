//! Daemon file locations, all under `~/.vaultsync/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use vaultsync_core::settings::{run_dir, vaults_dir, vaultsync_root};

/// Settings-file events for the same path closer together than this are
/// treated as one change.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    vaultsync_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    vaultsync_root(home).join("logs")
}

/// Everything the daemon logs.
pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

/// Warnings and errors only.
pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
