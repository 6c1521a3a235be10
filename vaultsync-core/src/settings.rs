//! Per-vault YAML settings store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.vaultsync/
//!   vaults/
//!     <vault_name>.yaml   (one file per registered vault, mode 0600)
//!   run/
//!     <vault_name>.lock   (present while a sync of that vault runs)
//! ```
//!
//! # API pattern
//!
//! Every function that touches disk has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SettingsError;
use crate::types::{Settings, VaultConfig, VaultName};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.vaultsync/`
pub fn vaultsync_root(home: &Path) -> PathBuf {
    home.join(".vaultsync")
}

/// `<home>/.vaultsync/vaults/`
pub fn vaults_dir(home: &Path) -> PathBuf {
    vaultsync_root(home).join("vaults")
}

/// `<home>/.vaultsync/run/`
pub fn run_dir(home: &Path) -> PathBuf {
    vaultsync_root(home).join("run")
}

/// `<home>/.vaultsync/vaults/<vault>.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path, vault: &VaultName) -> PathBuf {
    vaults_dir(home).join(format!("{}.yaml", vault.0))
}

/// `<home>/.vaultsync/run/<vault>.lock`. Pure, no I/O.
pub fn lock_path_at(home: &Path, vault: &VaultName) -> PathBuf {
    run_dir(home).join(format!("{}.lock", vault.0))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the settings of one vault, merged over the compiled-in defaults.
///
/// Returns `SettingsError::VaultNotFound` if absent,
/// `SettingsError::Parse` (with path) if malformed YAML.
pub fn load_at(home: &Path, vault: &VaultName) -> Result<VaultConfig, SettingsError> {
    let path = settings_path_at(home, vault);
    if !path.exists() {
        return Err(SettingsError::VaultNotFound { path });
    }
    read_config(&path)
}

/// `load_at` convenience wrapper.
pub fn load(vault: &VaultName) -> Result<VaultConfig, SettingsError> {
    load_at(&home()?, vault)
}

/// Every registered vault, sorted by name.
///
/// A document that cannot be read or parsed is logged and skipped; use
/// [`load_at`] to surface its error.
pub fn list_at(home: &Path) -> Result<Vec<VaultConfig>, SettingsError> {
    let dir = vaults_dir(home);
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".yaml"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    Ok(entries
        .iter()
        .filter_map(|e| match read_config(&e.path()) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("skipping unreadable vault settings: {err}");
                None
            }
        })
        .collect())
}

/// `list_at` convenience wrapper.
pub fn list() -> Result<Vec<VaultConfig>, SettingsError> {
    list_at(&home()?)
}

fn read_config(path: &Path) -> Result<VaultConfig, SettingsError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config: VaultConfig =
        serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    // Hand-edited files may carry an out-of-range interval.
    config.settings.auto_sync_interval = Settings::clamp_interval(config.settings.auto_sync_interval);
    Ok(config)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a vault's settings.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &VaultConfig) -> Result<(), SettingsError> {
    let dir = vaults_dir(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = settings_path_at(home, &config.name);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", config.name.0));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &VaultConfig) -> Result<(), SettingsError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Register
// ---------------------------------------------------------------------------

/// Register the vault rooted at `vault_path` with default settings.
///
/// The vault name is the directory name. Idempotent: if the vault is
/// already registered its stored settings are returned unchanged. A
/// different directory with the same name is refused with
/// [`SettingsError::NameConflict`].
pub fn register_at(home: &Path, vault_path: PathBuf) -> Result<VaultConfig, SettingsError> {
    let name = VaultName::from_path(&vault_path).ok_or_else(|| SettingsError::InvalidVaultPath {
        path: vault_path.clone(),
    })?;

    if settings_path_at(home, &name).exists() {
        let existing = load_at(home, &name)?;
        if !same_location(&existing.path, &vault_path) {
            return Err(SettingsError::NameConflict {
                name: name.to_string(),
                existing: existing.path,
                requested: vault_path,
            });
        }
        return Ok(existing);
    }

    let config = VaultConfig::new(name, vault_path);
    save_at(home, &config)?;
    Ok(config)
}

/// `register_at` convenience wrapper.
pub fn register(vault_path: PathBuf) -> Result<VaultConfig, SettingsError> {
    register_at(&home()?, vault_path)
}

// ---------------------------------------------------------------------------
// 5. Resolve
// ---------------------------------------------------------------------------

/// The registered vault whose root contains `path` (deepest root wins).
pub fn find_by_path_at(home: &Path, path: &Path) -> Result<Option<VaultConfig>, SettingsError> {
    let mut matches: Vec<VaultConfig> = list_at(home)?
        .into_iter()
        .filter(|config| path.starts_with(&config.path))
        .collect();
    matches.sort_by_key(|config| config.path.components().count());
    Ok(matches.pop())
}

/// Resolve a user-supplied vault selector.
///
/// `selector` is a registered vault name or a path inside a vault; `None`
/// means "the vault containing `cwd`".
pub fn resolve_at(
    home: &Path,
    selector: Option<&str>,
    cwd: &Path,
) -> Result<VaultConfig, SettingsError> {
    let target = match selector {
        Some(selector) => {
            let by_name = VaultName::from(selector);
            if settings_path_at(home, &by_name).exists() {
                return load_at(home, &by_name);
            }
            cwd.join(selector)
        }
        None => cwd.to_path_buf(),
    };

    let target = target.canonicalize().unwrap_or(target);
    find_by_path_at(home, &target)?.ok_or_else(|| SettingsError::VaultNotFound {
        path: target.clone(),
    })
}

/// `resolve_at` convenience wrapper.
pub fn resolve(selector: Option<&str>, cwd: &Path) -> Result<VaultConfig, SettingsError> {
    resolve_at(&home()?, selector, cwd)
}

// ---------------------------------------------------------------------------
// 6. Remote URL validation
// ---------------------------------------------------------------------------

fn url_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^https?://.+\..+/.+\.git$",
            r"^git@.+\..+:.+\.git$",
            r"^ssh://git@.+\..+:.+\.git$",
            r"^[a-z0-9]+://.+",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Whether `url` looks like a git remote. Empty URLs are accepted here; a
/// missing URL is reported when a sync is attempted.
pub fn is_valid_git_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url_patterns().iter().any(|pattern| pattern.is_match(url))
}

/// Non-blocking warning for a suspicious remote URL.
pub fn url_warning(settings: &Settings) -> Option<String> {
    if is_valid_git_url(&settings.git_url) {
        return None;
    }
    Some(format!(
        "warning: git URL '{}' does not look like a repository URL; check it",
        settings.git_url
    ))
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn vault() -> VaultName {
        VaultName::from("Notes")
    }

    #[test]
    fn settings_path_is_correct() {
        let home = make_home();
        let path = settings_path_at(home.path(), &vault());
        assert!(path.ends_with(".vaultsync/vaults/Notes.yaml"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        let mut config = VaultConfig::new(vault(), PathBuf::from("/vaults/Notes"));
        config.settings.git_url = "https://github.com/me/notes.git".to_string();
        config.settings.auto_sync_enabled = true;
        config.settings.set_interval(15);

        save_at(home.path(), &config).expect("save");
        let loaded = load_at(home.path(), &vault()).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = make_home();
        let config = VaultConfig::new(vault(), PathBuf::from("/vaults/Notes"));
        save_at(home.path(), &config).expect("save");
        let tmp = settings_path_at(home.path(), &vault()).with_file_name("Notes.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_merges_partial_document_over_defaults() {
        let home = make_home();
        let path = settings_path_at(home.path(), &vault());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "name: Notes\npath: /vaults/Notes\ngitUrl: git@github.com:me/notes.git\n",
        )
        .unwrap();

        let loaded = load_at(home.path(), &vault()).expect("load");
        assert_eq!(loaded.settings.git_url, "git@github.com:me/notes.git");
        assert!(!loaded.settings.auto_sync_enabled);
        assert_eq!(loaded.settings.auto_sync_interval, 30);
        assert_eq!(loaded.settings.last_sync_time, 0);
    }

    #[test]
    fn load_clamps_out_of_range_interval() {
        let home = make_home();
        let path = settings_path_at(home.path(), &vault());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "name: Notes\npath: /vaults/Notes\nautoSyncInterval: 999\n").unwrap();

        let loaded = load_at(home.path(), &vault()).expect("load");
        assert_eq!(loaded.settings.auto_sync_interval, 120);
    }

    #[test]
    fn load_missing_vault_returns_not_found() {
        let home = make_home();
        let err = load_at(home.path(), &vault()).unwrap_err();
        assert!(matches!(err, SettingsError::VaultNotFound { .. }));
    }

    #[test]
    fn list_empty_when_nothing_registered() {
        let home = make_home();
        assert!(list_at(home.path()).expect("list").is_empty());
    }

    #[test]
    fn register_rejects_root_path() {
        let home = make_home();
        let err = register_at(home.path(), PathBuf::from("/")).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidVaultPath { .. }));
    }

    #[test]
    fn find_by_path_prefers_deepest_vault() {
        let home = make_home();
        save_at(home.path(), &VaultConfig::new("outer".into(), PathBuf::from("/v/outer"))).unwrap();
        save_at(
            home.path(),
            &VaultConfig::new("inner".into(), PathBuf::from("/v/outer/inner")),
        )
        .unwrap();

        let found = find_by_path_at(home.path(), Path::new("/v/outer/inner/notes"))
            .unwrap()
            .expect("vault");
        assert_eq!(found.name.0, "inner");

        let found = find_by_path_at(home.path(), Path::new("/v/outer/x.md"))
            .unwrap()
            .expect("vault");
        assert_eq!(found.name.0, "outer");

        assert!(find_by_path_at(home.path(), Path::new("/elsewhere")).unwrap().is_none());
    }

    #[rstest]
    #[case("", true)]
    #[case("https://github.com/user/repo.git", true)]
    #[case("http://gitea.local.lan/team/notes.git", true)]
    #[case("git@github.com:user/repo.git", true)]
    #[case("ssh://git@github.com:user/repo.git", true)]
    #[case("git://example.org/repo", true)]
    #[case("file:///srv/git/notes.git", true)]
    #[case("github.com/user/repo", false)]
    #[case("not a url", false)]
    fn git_url_shapes(#[case] url: &str, #[case] valid: bool) {
        assert_eq!(is_valid_git_url(url), valid, "{url}");
    }

    #[test]
    fn url_warning_only_for_suspicious_urls() {
        let mut settings = Settings::default();
        assert!(url_warning(&settings).is_none());
        settings.git_url = "nonsense".to_string();
        assert!(url_warning(&settings).expect("warning").contains("nonsense"));
    }
}
