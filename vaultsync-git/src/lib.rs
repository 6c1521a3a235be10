//! # vaultsync-git
//!
//! Drives the system `git` binary to keep a vault in sync with its remote.
//!
//! Call [`pipeline::run`] to sync a registered vault, either whole or one
//! file/folder at a time. The lower layers ([`repo`], [`remote`], [`clone`])
//! are usable on their own; all of them go through a [`GitRunner`].

pub mod clone;
pub mod error;
pub mod lock;
pub mod outcome;
pub mod paths;
pub mod pipeline;
pub mod remote;
pub mod repo;
pub mod runner;

pub use clone::{clone_branch, list_remote_branches};
pub use error::{GitError, SyncError};
pub use lock::SyncLock;
pub use paths::{EntryKind, VaultEntry};
pub use pipeline::{CommitOutcome, PullOutcome, SyncReport, SyncScope};
pub use runner::{CommandOutput, GitRunner, SystemGit};
