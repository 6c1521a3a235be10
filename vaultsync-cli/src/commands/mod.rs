pub mod clone;
pub mod config;
pub mod daemon;
pub mod init;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};

use vaultsync_core::{settings, VaultConfig};
use vaultsync_daemon::DaemonError;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Resolve `--vault` (name or path) or, when absent, the vault containing
/// the current directory.
pub(crate) fn resolve_vault(home: &std::path::Path, selector: Option<&str>) -> Result<VaultConfig> {
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    settings::resolve_at(home, selector, &cwd).with_context(|| match selector {
        Some(selector) => format!("no registered vault matches '{selector}'"),
        None => "the current directory is not inside a registered vault; run `vaultsync init` or pass --vault"
            .to_string(),
    })
}

/// Tell a running daemon to re-read settings. A stopped daemon is fine.
pub(crate) fn notify_daemon(home: &std::path::Path) {
    match vaultsync_daemon::request_reload(home) {
        Ok(_) | Err(DaemonError::DaemonNotRunning { .. }) => {}
        Err(err) => eprintln!("note: daemon did not accept reload: {err}"),
    }
}
