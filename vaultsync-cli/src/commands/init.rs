//! `vaultsync init [PATH] [--url URL] [--auto-sync] [--interval MIN]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use vaultsync_core::settings;

/// Register a vault directory.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Vault root directory (defaults to the current directory).
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Remote repository URL.
    #[arg(long)]
    pub url: Option<String>,

    /// Enable automatic sync while the daemon runs.
    #[arg(long)]
    pub auto_sync: bool,

    /// Minutes between automatic syncs (5-120).
    #[arg(long, value_name = "MIN")]
    pub interval: Option<u32>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let path = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;
        anyhow::ensure!(path.is_dir(), "'{}' is not a directory", path.display());

        let mut config = settings::register_at(&home, path.clone())
            .with_context(|| format!("failed to register '{}'", path.display()))?;

        let mut changed = false;
        if let Some(url) = self.url {
            config.settings.git_url = url.trim().to_string();
            changed = true;
        }
        if self.auto_sync {
            config.settings.auto_sync_enabled = true;
            changed = true;
        }
        if let Some(minutes) = self.interval {
            config.settings.set_interval(minutes);
            changed = true;
        }
        if changed {
            settings::save_at(&home, &config)
                .with_context(|| format!("failed to save settings for '{}'", config.name))?;
            super::notify_daemon(&home);
        }

        println!(
            "✓ Registered vault '{}' (branch '{}')",
            config.name,
            config.branch()
        );
        println!(
            "  Saved to: {}",
            settings::settings_path_at(&home, &config.name).display()
        );
        if let Some(warning) = settings::url_warning(&config.settings) {
            eprintln!("{}", warning.yellow());
        }
        if !config.settings.has_url() {
            println!("  Next: vaultsync config set --url <repository-url>");
        }
        Ok(())
    }
}
