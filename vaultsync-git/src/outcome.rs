//! Classification of git output.
//!
//! Exit codes are the primary signal. git has no machine-readable mode for
//! "nothing to commit" or "remote ref missing", so those are recognized from
//! the message text here and nowhere else. The runner forces `LC_ALL=C`, so
//! the messages are untranslated.

use serde::Serialize;

use crate::runner::CommandOutput;

/// What a completed git invocation means for the sync sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Nothing to update ("Already up to date").
    UpToDate,
    /// `commit` found no staged changes.
    NothingToCommit,
    /// `pull` named a branch the remote does not have.
    MissingRemoteRef,
    Failed,
}

impl Outcome {
    /// Whether the plain runner contract treats this as success.
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success | Outcome::UpToDate)
    }
}

const UP_TO_DATE: &str = "Already up";
const NOTHING_TO_COMMIT: [&str; 2] = ["nothing to commit", "nothing added to commit"];
const MISSING_REMOTE_REF: &str = "couldn't find remote ref";

/// Classify one git invocation.
pub fn classify(output: &CommandOutput) -> Outcome {
    if output.stdout.contains(UP_TO_DATE) {
        return Outcome::UpToDate;
    }
    if output.code == Some(0) {
        return Outcome::Success;
    }

    let mentions = |needle: &str| output.stdout.contains(needle) || output.stderr.contains(needle);
    if NOTHING_TO_COMMIT.iter().any(|needle| mentions(needle)) {
        return Outcome::NothingToCommit;
    }
    if mentions(MISSING_REMOTE_REF) {
        return Outcome::MissingRemoteRef;
    }
    Outcome::Failed
}
