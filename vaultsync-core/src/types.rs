//! Domain types for vault settings.
//!
//! All path fields use `PathBuf`. Settings keys are persisted in camelCase
//! (`gitUrl`, `autoSyncEnabled`, `autoSyncInterval`, `lastSyncTime`).

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Branch used when a vault name has no character usable in a branch name.
pub const DEFAULT_BRANCH: &str = "main";

/// Default auto-sync interval in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;

/// Smallest accepted auto-sync interval in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 5;

/// Largest accepted auto-sync interval in minutes.
pub const MAX_INTERVAL_MINUTES: u32 = 120;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Display name of a vault: the final component of its root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultName(pub String);

impl VaultName {
    /// Name of the vault rooted at `path`, or `None` for paths like `/`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .map(|name| Self(name.to_string_lossy().into_owned()))
            .filter(|name| !name.0.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VaultName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VaultName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The single branch a vault pulls from and pushes to.
///
/// Derived from the vault name, never configured: every character outside
/// `[A-Za-z0-9_-]` becomes `-` and the result is lowercased. A name with no
/// permitted character at all maps to [`DEFAULT_BRANCH`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchName(pub String);

impl BranchName {
    pub fn from_vault_name(name: &str) -> Self {
        let permitted = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if !name.chars().any(permitted) {
            return Self(DEFAULT_BRANCH.to_string());
        }
        Self(
            name.chars()
                .map(|c| if permitted(c) { c.to_ascii_lowercase() } else { '-' })
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Persisted per-vault sync settings.
///
/// Every field has a compiled-in default, so a partial document on disk is
/// merged over [`Settings::default`] on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Remote repository URL. Empty means "not configured yet".
    pub git_url: String,
    pub auto_sync_enabled: bool,
    /// Minutes between automatic syncs, within
    /// `MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES`.
    pub auto_sync_interval: u32,
    /// Epoch milliseconds of the last successful whole-vault sync; 0 = never.
    pub last_sync_time: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            git_url: String::new(),
            auto_sync_enabled: false,
            auto_sync_interval: DEFAULT_INTERVAL_MINUTES,
            last_sync_time: 0,
        }
    }
}

impl Settings {
    /// Clamp `minutes` into the accepted interval range.
    pub fn clamp_interval(minutes: u32) -> u32 {
        minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES)
    }

    /// Set the auto-sync interval, clamping it into range.
    pub fn set_interval(&mut self, minutes: u32) {
        self.auto_sync_interval = Self::clamp_interval(minutes);
    }

    pub fn has_url(&self) -> bool {
        !self.git_url.trim().is_empty()
    }

    /// Record a successful whole-vault sync at `at`.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_sync_time = at.timestamp_millis();
    }

    /// The last successful sync, or `None` if the vault never synced.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        if self.last_sync_time <= 0 {
            return None;
        }
        Utc.timestamp_millis_opt(self.last_sync_time).single()
    }
}

// ---------------------------------------------------------------------------
// Vault config
// ---------------------------------------------------------------------------

/// A registered vault: its identity plus its [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub name: VaultName,
    /// Absolute path of the vault root directory.
    pub path: PathBuf,
    #[serde(flatten)]
    pub settings: Settings,
}

impl VaultConfig {
    pub fn new(name: VaultName, path: PathBuf) -> Self {
        Self {
            name,
            path,
            settings: Settings::default(),
        }
    }

    /// Branch this vault syncs with.
    pub fn branch(&self) -> BranchName {
        BranchName::from_vault_name(&self.name.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("My Vault", "my-vault")]
    #[case("notes_2024", "notes_2024")]
    #[case("Work-Notes", "work-notes")]
    #[case("a.b/c", "a-b-c")]
    #[case("日记 Daily", "---daily")]
    #[case("日记", DEFAULT_BRANCH)]
    #[case("", DEFAULT_BRANCH)]
    #[case("!!!", DEFAULT_BRANCH)]
    fn branch_name_derivation(#[case] vault: &str, #[case] expected: &str) {
        assert_eq!(BranchName::from_vault_name(vault).as_str(), expected);
    }

    #[test]
    fn branch_name_only_contains_permitted_characters() {
        for vault in ["Ünïcödé Vault", "tabs\tand\nnewlines", "emoji 🎉 notes", "UPPER"] {
            let branch = BranchName::from_vault_name(vault);
            assert!(
                branch
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'),
                "unexpected character in {branch}"
            );
        }
    }

    #[test]
    fn interval_is_clamped() {
        let mut settings = Settings::default();
        settings.set_interval(1);
        assert_eq!(settings.auto_sync_interval, MIN_INTERVAL_MINUTES);
        settings.set_interval(10_000);
        assert_eq!(settings.auto_sync_interval, MAX_INTERVAL_MINUTES);
        settings.set_interval(45);
        assert_eq!(settings.auto_sync_interval, 45);
    }

    #[test]
    fn last_sync_at_is_none_until_marked() {
        let mut settings = Settings::default();
        assert!(settings.last_sync_at().is_none());

        let now = Utc::now();
        settings.mark_synced(now);
        assert_eq!(
            settings.last_sync_at().map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }

    #[test]
    fn vault_name_from_path_uses_last_component() {
        assert_eq!(
            VaultName::from_path(Path::new("/home/me/Notes")),
            Some(VaultName::from("Notes"))
        );
        assert_eq!(VaultName::from_path(Path::new("/")), None);
    }
}
