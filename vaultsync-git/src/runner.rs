//! Command runner: the only place that spawns the git executable.
//!
//! [`GitRunner::exec`] runs git once and hands back everything it printed;
//! [`run_git`] layers the success contract on top (see [`crate::outcome`]).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::GitError;
use crate::outcome::classify;

/// Raw result of one completed git process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Something that can execute git with an argument vector in a directory.
///
/// Errors are reserved for failing to run the process at all; a non-zero
/// exit is reported through [`CommandOutput::code`].
pub trait GitRunner: Send + Sync {
    fn exec(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, GitError>;
}

/// Runs the real `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new("git")
    }
}

impl SystemGit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            envs: Vec::new(),
        }
    }

    /// Add an environment variable to every invocation.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl GitRunner for SystemGit {
    fn exec(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            // Fail instead of blocking on a credential prompt, and keep
            // messages in the untranslated form `outcome::classify` reads.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| GitError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run git and return its raw output, logging the invocation.
pub fn invoke(
    runner: &dyn GitRunner,
    cwd: &Path,
    args: &[&str],
) -> Result<CommandOutput, GitError> {
    tracing::debug!("git {} (in {})", args.join(" "), cwd.display());
    let output = runner.exec(cwd, args)?;
    tracing::debug!("git {} exited with {:?}", args.join(" "), output.code);
    Ok(output)
}

/// Run git and apply the success contract.
///
/// Succeeds with trimmed stdout when git exits zero or reports that there
/// was nothing to update; otherwise fails with git's stderr.
pub fn run_git(runner: &dyn GitRunner, cwd: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = invoke(runner, cwd, args)?;
    if classify(&output).is_success() {
        Ok(output.stdout.trim().to_string())
    } else {
        Err(failure(args, &output))
    }
}

/// Build the error for a failed invocation.
pub fn failure(args: &[&str], output: &CommandOutput) -> GitError {
    let joined = args.join(" ");
    let stderr = output.stderr.trim();
    let message = if stderr.is_empty() {
        match output.code {
            Some(code) => format!("git {joined} failed with code {code}"),
            None => format!("git {joined} was terminated by a signal"),
        }
    } else {
        stderr.to_string()
    };
    GitError::CommandFailed {
        args: joined,
        code: output.code,
        message,
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeGit;
    use super::*;

    #[test]
    fn run_git_returns_trimmed_stdout_on_zero_exit() {
        let git = FakeGit::new().on(&["rev-parse"], CommandOutput::success("  abc123\n"));
        let out = run_git(&git, Path::new("."), &["rev-parse", "HEAD"]).expect("ok");
        assert_eq!(out, "abc123");
    }

    #[test]
    fn run_git_treats_already_up_to_date_as_success_even_on_failure_code() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "Already up to date.\n".to_string(),
            stderr: "warning: something".to_string(),
        };
        let git = FakeGit::new().on(&["pull"], output);
        let out = run_git(&git, Path::new("."), &["pull", "origin", "main"]).expect("ok");
        assert_eq!(out, "Already up to date.");
    }

    #[test]
    fn run_git_failure_carries_stderr() {
        let git = FakeGit::new().on(
            &["push"],
            CommandOutput::failure(128, "fatal: could not read from remote\n"),
        );
        let err = run_git(&git, Path::new("."), &["push", "origin", "HEAD:main"]).unwrap_err();
        assert_eq!(err.to_string(), "fatal: could not read from remote");
        assert!(matches!(err, GitError::CommandFailed { code: Some(128), .. }));
    }

    #[test]
    fn run_git_failure_without_stderr_reports_code() {
        let git = FakeGit::new().on(&["status"], CommandOutput::failure(2, ""));
        let err = run_git(&git, Path::new("."), &["status", "--porcelain"]).unwrap_err();
        assert_eq!(err.to_string(), "git status --porcelain failed with code 2");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let git = SystemGit::new("/nonexistent/definitely-not-git");
        let err = git.exec(Path::new("."), &["status"]).unwrap_err();
        assert!(matches!(err, GitError::Spawn { .. }));
    }
}
