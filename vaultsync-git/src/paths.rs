//! Vault entries and the relative paths handed to `git add`.
//!
//! Anything reaching the argument vector must be a plain vault-relative
//! path: no traversal segments, no absolute paths, no glob characters, no
//! angle brackets, and no leading dash that git would read as an option.

use std::path::{Component, Path};

use serde::Serialize;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// A file or folder inside a vault.
///
/// `path` is vault-relative with `/` separators; the vault root folder has
/// path `/`. `parent` is the parent folder's path, `None` for the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultEntry {
    pub kind: EntryKind,
    pub path: String,
    pub name: String,
    pub parent: Option<String>,
}

impl VaultEntry {
    pub fn file(path: &str) -> Self {
        Self::with_kind(EntryKind::File, path)
    }

    pub fn folder(path: &str) -> Self {
        Self::with_kind(EntryKind::Folder, path)
    }

    /// The vault root folder.
    pub fn root() -> Self {
        Self {
            kind: EntryKind::Folder,
            path: "/".to_string(),
            name: String::new(),
            parent: None,
        }
    }

    fn with_kind(kind: EntryKind, path: &str) -> Self {
        let path = path.replace('\\', "/");
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Self::root();
        }
        let (parent, name) = match trimmed.rsplit_once('/') {
            Some(("", name)) => ("/".to_string(), name.to_string()),
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => ("/".to_string(), trimmed.to_string()),
        };
        Self {
            kind,
            path: trimmed.to_string(),
            name,
            parent: Some(parent),
        }
    }

    /// Build an entry for `target`, an absolute path inside `vault_root` or
    /// a path relative to it. Directories become folders, anything else
    /// (including paths that no longer exist) a file.
    pub fn from_fs(vault_root: &Path, target: &Path) -> Result<Self, SyncError> {
        let absolute = if target.is_absolute() {
            target.to_path_buf()
        } else {
            vault_root.join(target)
        };
        let relative = absolute
            .strip_prefix(vault_root)
            .map_err(|_| SyncError::InvalidPath {
                path: target.display().to_string(),
                reason: "outside the vault",
            })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(SyncError::InvalidPath {
                        path: target.display().to_string(),
                        reason: "contains a traversal segment",
                    })
                }
            }
        }

        let joined = segments.join("/");
        if absolute.is_dir() {
            Ok(Self::folder(&joined))
        } else {
            Ok(Self::file(&joined))
        }
    }

    /// Path to stage for this entry, validated.
    ///
    /// A folder stages its own path, a file its parent's path joined with
    /// its name; the root folder stages `.`.
    pub fn relative_path(&self) -> Result<String, SyncError> {
        let relative = match self.kind {
            EntryKind::Folder => root_as_dot(&self.path),
            EntryKind::File => {
                let parent = root_as_dot(self.parent.as_deref().unwrap_or("/"));
                if parent == "." {
                    self.name.replace('\\', "/")
                } else {
                    format!("{parent}/{}", self.name.replace('\\', "/"))
                }
            }
        };
        validate_relative_path(&relative)?;
        Ok(relative)
    }
}

fn root_as_dot(path: &str) -> String {
    let path = path.replace('\\', "/");
    if path.is_empty() || path == "/" {
        ".".to_string()
    } else {
        path
    }
}

/// Reject paths that must never reach `git add`.
pub fn validate_relative_path(path: &str) -> Result<(), SyncError> {
    let normalized = path.replace('\\', "/");
    let reject = |reason| {
        Err(SyncError::InvalidPath {
            path: path.to_string(),
            reason,
        })
    };

    if normalized.starts_with('/') {
        return reject("absolute path");
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return reject("contains a traversal segment");
    }
    if normalized.contains(['*', '?']) {
        return reject("contains a wildcard");
    }
    if normalized.contains(['<', '>']) {
        return reject("contains an angle bracket");
    }
    if normalized.starts_with('-') {
        return reject("starts with a dash");
    }
    Ok(())
}
