//! Error types for vaultsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from settings persistence.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse vault settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.vaultsync/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No settings document exists for the requested vault.
    #[error("vault not registered: no settings at {path}")]
    VaultNotFound { path: PathBuf },

    /// Another directory with the same name is already registered.
    #[error(
        "a vault named '{name}' is already registered at {existing}; \
         cannot also register {requested}"
    )]
    NameConflict {
        name: String,
        existing: PathBuf,
        requested: PathBuf,
    },

    /// The vault directory has no usable display name (e.g. `/`).
    #[error("cannot derive a vault name from {path}")]
    InvalidVaultPath { path: PathBuf },
}
