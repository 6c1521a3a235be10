//! Repository state: detect a working tree, create one if missing.

use std::path::Path;

use crate::error::GitError;
use crate::runner::{run_git, GitRunner};

/// Committer identity written into every repository vaultsync initializes,
/// so commits work on machines without a global git identity.
pub const COMMITTER_NAME: &str = "VaultSync";
pub const COMMITTER_EMAIL: &str = "vaultsync@example.com";

/// Whether `dir` is inside a git working tree.
///
/// Any failure (no repository, missing binary, unreadable `.git`) counts as
/// "not a repository".
pub fn is_repository(runner: &dyn GitRunner, dir: &Path) -> bool {
    match run_git(runner, dir, &["status", "--porcelain"]) {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!("{} is not a git repository: {err}", dir.display());
            false
        }
    }
}

/// `git init` plus a repository-local committer identity.
pub fn initialize(runner: &dyn GitRunner, dir: &Path) -> Result<(), GitError> {
    run_git(runner, dir, &["init"])?;
    run_git(runner, dir, &["config", "user.email", COMMITTER_EMAIL])?;
    run_git(runner, dir, &["config", "user.name", COMMITTER_NAME])?;
    tracing::info!("initialized git repository in {}", dir.display());
    Ok(())
}

/// Initialize `dir` unless it already is a repository.
///
/// Returns `true` when a repository was created.
pub fn ensure_repository(runner: &dyn GitRunner, dir: &Path) -> Result<bool, GitError> {
    if is_repository(runner, dir) {
        return Ok(false);
    }
    tracing::info!("{} is not a git repository, initializing", dir.display());
    initialize(runner, dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeGit;
    use crate::runner::CommandOutput;

    #[test]
    fn existing_repository_is_left_alone() {
        let git = FakeGit::new();
        let created = ensure_repository(&git, Path::new("/vault")).expect("ensure");
        assert!(!created);
        assert_eq!(git.call_lines(), vec!["status --porcelain"]);
    }

    #[test]
    fn missing_repository_is_initialized_with_identity() {
        let git = FakeGit::new().on(
            &["status"],
            CommandOutput::failure(128, "fatal: not a git repository"),
        );
        let created = ensure_repository(&git, Path::new("/vault")).expect("ensure");
        assert!(created);
        assert_eq!(
            git.call_lines(),
            vec![
                "status --porcelain".to_string(),
                "init".to_string(),
                format!("config user.email {COMMITTER_EMAIL}"),
                format!("config user.name {COMMITTER_NAME}"),
            ]
        );
    }

    #[test]
    fn init_failure_stops_before_identity() {
        let git = FakeGit::new()
            .on(&["status"], CommandOutput::failure(128, "fatal: not a git repository"))
            .on(&["init"], CommandOutput::failure(1, "permission denied"));
        let err = ensure_repository(&git, Path::new("/vault")).unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(git.calls().len(), 2);
    }
}
