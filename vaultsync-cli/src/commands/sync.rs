//! `vaultsync sync`: whole-vault or single-path sync.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use vaultsync_core::VaultConfig;
use vaultsync_git::{
    pipeline::{self, CommitOutcome, PullOutcome, SyncScope},
    SyncReport, SystemGit, VaultEntry,
};

/// Arguments for `vaultsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Vault name or path (defaults to the vault containing the current directory).
    #[arg(long)]
    pub vault: Option<String>,

    /// Commit and push only this file or folder; no pull.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Hand the sync to the running daemon instead of running git here.
    #[arg(long)]
    pub daemon: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = super::resolve_vault(&home, self.vault.as_deref())?;

        let entry = match &self.path {
            Some(path) => Some(entry_for(&config, path)?),
            None => None,
        };

        if self.daemon {
            let path = entry
                .as_ref()
                .map(|entry| entry.relative_path())
                .transpose()
                .with_context(|| format!("cannot sync '{}'", config.name))?;
            let data = vaultsync_daemon::request_sync(&home, Some(config.name.to_string()), path)
                .with_context(|| format!("daemon sync failed for vault '{}'", config.name))?;
            let report: SyncReport = serde_json::from_value(data)
                .context("daemon returned an unexpected sync report")?;
            print_report(&report);
            return Ok(());
        }

        let scope = match entry {
            Some(entry) => SyncScope::Entry(entry),
            None => SyncScope::Vault,
        };
        let report = pipeline::run(&home, &SystemGit::default(), &config.name, scope)
            .with_context(|| format!("sync failed for vault '{}'", config.name))?;
        print_report(&report);
        Ok(())
    }
}

/// Build the entry for a user-supplied path: relative to the current
/// directory, and required to lie inside the vault.
fn entry_for(config: &VaultConfig, path: &Path) -> Result<VaultEntry> {
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let absolute = cwd.join(path);
    let absolute = absolute.canonicalize().unwrap_or(absolute);
    VaultEntry::from_fs(&config.path, &absolute)
        .with_context(|| format!("cannot sync '{}'", path.display()))
}

fn print_report(report: &SyncReport) {
    if report.initialized {
        println!("  initialized git repository in vault '{}'", report.vault);
    }
    match &report.pull {
        Some(PullOutcome::Pulled(output)) if !output.is_empty() => {
            for line in output.lines() {
                println!("  {}", line.dimmed());
            }
        }
        Some(PullOutcome::RemoteBranchMissing) => {
            println!("  branch '{}' is new on the remote", report.branch);
        }
        _ => {}
    }
    if let CommitOutcome::Committed(output) = &report.commit {
        if let Some(first) = output.lines().next() {
            println!("  {}", first.dimmed());
        }
    }
    println!("{} {}", "✓".green(), report.summary());
}
