//! `vaultsync branches` and `vaultsync clone`.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use vaultsync_core::VaultConfig;
use vaultsync_git::{clone_branch, list_remote_branches, SyncError, SystemGit};

/// List the branches published by the remote.
#[derive(Args, Debug)]
pub struct BranchesArgs {
    /// Vault name or path (defaults to the vault containing the current directory).
    #[arg(long)]
    pub vault: Option<String>,

    /// Query this URL instead of the vault's configured one.
    #[arg(long)]
    pub url: Option<String>,
}

impl BranchesArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = super::resolve_vault(&home, self.vault.as_deref())?;
        let url = remote_url(&config, self.url.as_deref())?;

        let branches = list_remote_branches(&SystemGit::default(), &url)
            .with_context(|| format!("failed to list branches of {url}"))?;
        if branches.is_empty() {
            println!("No branches on {url}");
            return Ok(());
        }

        let own = config.branch();
        for branch in branches {
            if branch == own.as_str() {
                println!("{} {} {}", "*".green(), branch.bold(), "(this vault)".dimmed());
            } else {
                println!("  {branch}");
            }
        }
        Ok(())
    }
}

/// Clone a remote branch into the vault directory.
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Branch to clone (defaults to the vault's own branch).
    #[arg(long)]
    pub branch: Option<String>,

    /// Vault name or path (defaults to the vault containing the current directory).
    #[arg(long)]
    pub vault: Option<String>,

    /// Clone from this URL instead of the vault's configured one.
    #[arg(long)]
    pub url: Option<String>,
}

impl CloneArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = super::resolve_vault(&home, self.vault.as_deref())?;
        let url = remote_url(&config, self.url.as_deref())?;
        let git = SystemGit::default();

        let branch = match self.branch {
            Some(branch) => branch,
            None => {
                let own = config.branch().to_string();
                let branches = list_remote_branches(&git, &url)
                    .with_context(|| format!("failed to list branches of {url}"))?;
                if !branches.contains(&own) {
                    if branches.is_empty() {
                        bail!("branch '{own}' not found on {url}; the remote has no branches");
                    }
                    bail!(
                        "branch '{own}' not found on {url}; pass --branch with one of: {}",
                        branches.join(", ")
                    );
                }
                own
            }
        };

        println!(
            "Cloning {} ({}) into {}",
            url,
            branch.bold(),
            config.path.display()
        );
        clone_branch(&git, &config.path, &url, &branch)
            .with_context(|| format!("clone into '{}' failed", config.path.display()))?;
        println!("{} Clone complete", "✓".green());
        Ok(())
    }
}

fn remote_url(config: &VaultConfig, flag: Option<&str>) -> Result<String> {
    let url = flag
        .map(str::trim)
        .unwrap_or_else(|| config.settings.git_url.trim());
    if url.is_empty() {
        return Err(SyncError::MissingUrl.into());
    }
    Ok(url.to_string())
}
