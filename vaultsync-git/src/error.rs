//! Error types for vaultsync-git.

use std::path::PathBuf;

use thiserror::Error;

use vaultsync_core::SettingsError;

/// Failures of a single git invocation.
#[derive(Debug, Error)]
pub enum GitError {
    /// The executable could not be started (missing binary, bad cwd, ...).
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// git ran and reported failure. `message` is its stderr, verbatim
    /// apart from surrounding whitespace.
    #[error("{message}")]
    CommandFailed {
        args: String,
        code: Option<i32>,
        message: String,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that can abort a sync attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No remote URL configured; nothing was executed.
    #[error("git repository URL is not configured; set one with `vaultsync config set --url <url>`")]
    MissingUrl,

    /// A single-path sync target failed validation before staging.
    #[error("invalid file path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// Another sync of the same vault holds the lock.
    #[error("sync already in progress for vault '{vault}'")]
    InProgress { vault: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`GitError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> GitError {
    GitError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn sync_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
