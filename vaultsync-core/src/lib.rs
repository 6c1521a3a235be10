//! vaultsync core library: vault settings types, persistence, errors.
//!
//! - [`types`]: newtypes and the settings document
//! - [`error`]: [`SettingsError`]
//! - [`settings`]: load / save / register / resolve, URL validation

pub mod error;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use types::{BranchName, Settings, VaultConfig, VaultName, DEFAULT_BRANCH};
