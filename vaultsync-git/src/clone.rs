//! Remote branch listing and branch cloning.

use std::path::Path;

use crate::error::{io_err, GitError};
use crate::runner::{run_git, GitRunner};

const HEADS_PREFIX: &str = "refs/heads/";

/// List the branch names published by `url`.
///
/// `ls-remote` runs in a scratch directory that is removed on every path,
/// so it never depends on (or touches) a local repository.
pub fn list_remote_branches(runner: &dyn GitRunner, url: &str) -> Result<Vec<String>, GitError> {
    let scratch = tempfile::Builder::new()
        .prefix("vaultsync-ls-remote-")
        .tempdir()
        .map_err(|e| io_err(std::env::temp_dir(), e))?;
    let scratch_path = scratch.path().to_path_buf();

    let listed = run_git(runner, &scratch_path, &["ls-remote", "--heads", url]);
    scratch.close().map_err(|e| io_err(&scratch_path, e))?;

    let branches = parse_heads(&listed?);
    tracing::info!("{url} has {} branch(es)", branches.len());
    Ok(branches)
}

/// Extract branch names from `ls-remote --heads` output.
///
/// Lines look like `<sha>\trefs/heads/<name>`; anything else is skipped.
pub fn parse_heads(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .filter_map(|(_, reference)| reference.trim().strip_prefix(HEADS_PREFIX))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Clone `branch` of `url` into `vault_path`.
///
/// git runs in the vault's parent directory with the vault's directory name
/// as the target, so a non-empty vault directory fails with git's own
/// "already exists and is not an empty directory" message.
pub fn clone_branch(
    runner: &dyn GitRunner,
    vault_path: &Path,
    url: &str,
    branch: &str,
) -> Result<(), GitError> {
    let parent = vault_path.parent().ok_or_else(|| {
        io_err(
            vault_path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "vault path has no parent directory",
            ),
        )
    })?;
    let target = vault_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io_err(
                vault_path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "vault path has no name"),
            )
        })?;

    run_git(runner, parent, &["clone", "--branch", branch, url, &target])?;
    tracing::info!("cloned {url} ({branch}) into {}", vault_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::runner::fake::FakeGit;
    use crate::runner::CommandOutput;

    #[test]
    fn parse_heads_keeps_only_branch_refs() {
        let output = "\
3f1e2d\trefs/heads/main
9a8b7c\trefs/heads/my-vault
deadbe\trefs/tags/v1
garbage line without tab
cafe00\trefs/heads/feature/x
";
        assert_eq!(parse_heads(output), vec!["main", "my-vault", "feature/x"]);
    }

    #[test]
    fn parse_heads_of_empty_remote_is_empty() {
        assert!(parse_heads("").is_empty());
    }

    #[test]
    fn list_remote_branches_removes_scratch_dir_on_success_and_failure() {
        let git = FakeGit::new().on(
            &["ls-remote"],
            CommandOutput::success("abc\trefs/heads/main\n"),
        );
        let branches = list_remote_branches(&git, "https://example.com/n.git").expect("list");
        assert_eq!(branches, vec!["main"]);
        let scratch = &git.dirs()[0];
        assert!(scratch
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("vaultsync-ls-remote-"));
        assert!(!scratch.exists());

        let failing = FakeGit::new().on(
            &["ls-remote"],
            CommandOutput::failure(128, "fatal: repository not found"),
        );
        let err = list_remote_branches(&failing, "https://example.com/n.git").unwrap_err();
        assert_eq!(err.to_string(), "fatal: repository not found");
        assert!(!failing.dirs()[0].exists());
    }

    #[test]
    fn clone_targets_vault_directory_name() {
        let git = FakeGit::new();
        clone_branch(
            &git,
            Path::new("/home/me/Notes"),
            "git@example.com:me/notes.git",
            "notes",
        )
        .expect("clone");
        assert_eq!(
            git.call_lines(),
            vec!["clone --branch notes git@example.com:me/notes.git Notes"]
        );
        assert_eq!(git.dirs(), vec![PathBuf::from("/home/me")]);
    }

    #[test]
    fn clone_failure_message_is_git_stderr() {
        let git = FakeGit::new().on(
            &["clone"],
            CommandOutput::failure(
                128,
                "fatal: destination path 'Notes' already exists and is not an empty directory.\n",
            ),
        );
        let err = clone_branch(&git, Path::new("/home/me/Notes"), "u", "main").unwrap_err();
        assert_eq!(
            err.to_string(),
            "fatal: destination path 'Notes' already exists and is not an empty directory."
        );
    }
}
