//! Shared sync pipeline entrypoint used by the CLI and the daemon.
//!
//! [`run`] is the only way either front end syncs a vault: it loads the
//! settings, refuses to start without a URL, takes the per-vault
//! [`SyncLock`], runs the sequence and records the sync time.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use vaultsync_core::{settings, VaultConfig, VaultName};

use crate::error::{GitError, SyncError};
use crate::lock::SyncLock;
use crate::outcome::{classify, Outcome};
use crate::paths::VaultEntry;
use crate::remote::{upsert_remote, REMOTE_NAME};
use crate::repo::ensure_repository;
use crate::runner::{failure, invoke, run_git, GitRunner};

/// Commit message of a whole-vault sync.
pub const VAULT_COMMIT_MESSAGE: &str = "Automatic sync";

/// What a pipeline run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Pull, commit everything, push.
    Vault,
    /// Commit and push one file or folder, without pulling.
    Entry(VaultEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "output", rename_all = "snake_case")]
pub enum PullOutcome {
    Pulled(String),
    UpToDate,
    /// The vault's branch is not on the remote yet; the push creates it.
    RemoteBranchMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "output", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed(String),
    NothingToCommit,
}

/// Result of one successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub vault: String,
    pub branch: String,
    /// `vault`, or the staged vault-relative path.
    pub scope: String,
    /// Whether the vault had to be turned into a repository first.
    pub initialized: bool,
    /// `None` for single-path syncs, which never pull.
    pub pull: Option<PullOutcome>,
    pub commit: CommitOutcome,
    /// Push output; `None` when nothing was committed.
    pub push: Option<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn pushed(&self) -> bool {
        self.push.is_some()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match (&self.pull, &self.commit) {
            (_, CommitOutcome::NothingToCommit) if self.pull.is_none() => {
                format!("{} has no changes, no commit needed", self.scope)
            }
            (_, CommitOutcome::NothingToCommit) => "No changes to commit".to_string(),
            (None, CommitOutcome::Committed(_)) => {
                format!("{} synced to {REMOTE_NAME}/{}", self.scope, self.branch)
            }
            (Some(pull), CommitOutcome::Committed(_)) => {
                let pull = match pull {
                    PullOutcome::Pulled(_) => "updated",
                    PullOutcome::UpToDate => "up to date",
                    PullOutcome::RemoteBranchMissing => "new branch",
                };
                format!(
                    "Sync complete: pull={pull}, push={REMOTE_NAME}/{}",
                    self.branch
                )
            }
        }
    }
}

/// Run one sync of `vault`.
///
/// The URL is checked before anything is spawned. A whole-vault sync that
/// completes stamps `lastSyncTime`; a failed one leaves it untouched.
pub fn run(
    home: &Path,
    runner: &dyn GitRunner,
    vault: &VaultName,
    scope: SyncScope,
) -> Result<SyncReport, SyncError> {
    let config = settings::load_at(home, vault)?;
    if !config.settings.has_url() {
        return Err(SyncError::MissingUrl);
    }

    let _lock = SyncLock::acquire(&settings::lock_path_at(home, vault), vault)?;

    match scope {
        SyncScope::Vault => {
            let report = sync_vault(runner, &config)?;
            // Reload so edits made while git was running are not lost.
            let mut latest = settings::load_at(home, vault)?;
            latest.settings.mark_synced(Utc::now());
            settings::save_at(home, &latest)?;
            Ok(report)
        }
        SyncScope::Entry(entry) => sync_entry(runner, &config, &entry),
    }
}

/// Pull, commit everything and push, for one vault.
///
/// Callers are expected to hold the vault's [`SyncLock`]; [`run`] does.
pub fn sync_vault(runner: &dyn GitRunner, config: &VaultConfig) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let branch = config.branch();
    let dir = config.path.as_path();
    let url = require_url(config)?;

    tracing::info!("syncing vault '{}' on branch {branch}", config.name);
    let initialized = ensure_repository(runner, dir)?;
    upsert_remote(runner, dir, url)?;
    let pull = pull(runner, dir, branch.as_str())?;
    stage(runner, dir, ".")?;
    let commit = commit(runner, dir, VAULT_COMMIT_MESSAGE)?;
    let push = push_if_committed(runner, dir, branch.as_str(), &commit)?;

    Ok(SyncReport {
        vault: config.name.to_string(),
        branch: branch.to_string(),
        scope: "vault".to_string(),
        initialized,
        pull: Some(pull),
        commit,
        push,
        duration_ms: elapsed_ms(started),
    })
}

/// Commit and push a single file or folder.
///
/// The path is validated before any git process starts. No pull happens.
pub fn sync_entry(
    runner: &dyn GitRunner,
    config: &VaultConfig,
    entry: &VaultEntry,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let url = require_url(config)?;
    let relative = entry.relative_path()?;
    let branch = config.branch();
    let dir = config.path.as_path();

    tracing::info!("syncing '{relative}' of vault '{}'", config.name);
    let initialized = ensure_repository(runner, dir)?;
    upsert_remote(runner, dir, url)?;
    stage(runner, dir, &relative)?;
    let commit = commit(runner, dir, &format!("Sync: {relative}"))?;
    let push = push_if_committed(runner, dir, branch.as_str(), &commit)?;

    Ok(SyncReport {
        vault: config.name.to_string(),
        branch: branch.to_string(),
        scope: relative,
        initialized,
        pull: None,
        commit,
        push,
        duration_ms: elapsed_ms(started),
    })
}

fn require_url(config: &VaultConfig) -> Result<&str, SyncError> {
    if config.settings.has_url() {
        Ok(config.settings.git_url.trim())
    } else {
        Err(SyncError::MissingUrl)
    }
}

fn pull(runner: &dyn GitRunner, dir: &Path, branch: &str) -> Result<PullOutcome, GitError> {
    let args = ["pull", "--no-rebase", REMOTE_NAME, branch];
    let output = invoke(runner, dir, &args)?;
    let outcome = match classify(&output) {
        Outcome::Success => PullOutcome::Pulled(output.stdout.trim().to_string()),
        Outcome::UpToDate => PullOutcome::UpToDate,
        Outcome::MissingRemoteRef => {
            tracing::info!("branch {branch} not on {REMOTE_NAME} yet, skipping pull");
            PullOutcome::RemoteBranchMissing
        }
        Outcome::NothingToCommit | Outcome::Failed => return Err(failure(&args, &output)),
    };
    tracing::info!("pull {branch}: {outcome:?}");
    Ok(outcome)
}

fn stage(runner: &dyn GitRunner, dir: &Path, path: &str) -> Result<(), GitError> {
    run_git(runner, dir, &["add", path])?;
    Ok(())
}

fn commit(runner: &dyn GitRunner, dir: &Path, message: &str) -> Result<CommitOutcome, GitError> {
    let args = ["commit", "-m", message];
    let output = invoke(runner, dir, &args)?;
    match classify(&output) {
        Outcome::Success | Outcome::UpToDate => {
            tracing::info!("committed: {message}");
            Ok(CommitOutcome::Committed(output.stdout.trim().to_string()))
        }
        Outcome::NothingToCommit => {
            tracing::info!("nothing to commit");
            Ok(CommitOutcome::NothingToCommit)
        }
        Outcome::MissingRemoteRef | Outcome::Failed => Err(failure(&args, &output)),
    }
}

fn push_if_committed(
    runner: &dyn GitRunner,
    dir: &Path,
    branch: &str,
    commit: &CommitOutcome,
) -> Result<Option<String>, GitError> {
    if *commit == CommitOutcome::NothingToCommit {
        return Ok(None);
    }
    let refspec = format!("HEAD:{branch}");
    let output = run_git(runner, dir, &["push", REMOTE_NAME, &refspec])?;
    tracing::info!("pushed to {REMOTE_NAME}/{branch}");
    Ok(Some(output))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
