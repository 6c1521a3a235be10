//! Remote configuration: exactly one `origin`, pointing at the settings URL.

use std::path::Path;

use crate::error::GitError;
use crate::runner::{run_git, GitRunner};

pub const REMOTE_NAME: &str = "origin";

/// Point `origin` at `url`, replacing whatever was there.
///
/// Removal failure is expected when no `origin` exists yet and is ignored.
pub fn upsert_remote(runner: &dyn GitRunner, dir: &Path, url: &str) -> Result<(), GitError> {
    if let Err(err) = run_git(runner, dir, &["remote", "remove", REMOTE_NAME]) {
        tracing::debug!("no {REMOTE_NAME} remote to remove: {err}");
    }
    run_git(runner, dir, &["remote", "add", REMOTE_NAME, url])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeGit;
    use crate::runner::CommandOutput;

    #[test]
    fn missing_origin_is_not_an_error() {
        let git = FakeGit::new().on(
            &["remote", "remove"],
            CommandOutput::failure(2, "error: No such remote: 'origin'"),
        );
        upsert_remote(&git, Path::new("/vault"), "https://example.com/notes.git").expect("upsert");
        assert_eq!(
            git.call_lines(),
            vec![
                "remote remove origin",
                "remote add origin https://example.com/notes.git"
            ]
        );
    }

    #[test]
    fn add_failure_propagates() {
        let git = FakeGit::new().on(
            &["remote", "add"],
            CommandOutput::failure(3, "error: remote origin already exists."),
        );
        let err = upsert_remote(&git, Path::new("/vault"), "u").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
