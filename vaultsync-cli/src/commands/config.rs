//! `vaultsync config show|set`: per-vault sync settings.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Subcommand};
use colored::Colorize;
use serde::Serialize;

use vaultsync_core::{settings, types, VaultConfig};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the vault's settings.
    Show(ShowArgs),
    /// Change one or more settings.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Vault name or path (defaults to the vault containing the current directory).
    #[arg(long)]
    pub vault: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("change")
        .required(true)
        .multiple(true)
        .args(["url", "auto_sync", "interval"]),
))]
pub struct SetArgs {
    /// Vault name or path (defaults to the vault containing the current directory).
    #[arg(long)]
    pub vault: Option<String>,

    /// Remote repository URL; pass "" to clear it.
    #[arg(long)]
    pub url: Option<String>,

    /// Turn automatic sync on or off.
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub auto_sync: Option<bool>,

    /// Minutes between automatic syncs (5-120).
    #[arg(long, value_name = "MIN")]
    pub interval: Option<u32>,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = super::home()?;
    match command {
        ConfigCommand::Show(args) => {
            let config = super::resolve_vault(&home, args.vault.as_deref())?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ConfigJson::from(&config))
                        .context("failed to serialize settings JSON")?
                );
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Set(args) => {
            let mut config = super::resolve_vault(&home, args.vault.as_deref())?;

            if let Some(url) = args.url {
                config.settings.git_url = url.trim().to_string();
            }
            if let Some(enabled) = args.auto_sync {
                config.settings.auto_sync_enabled = enabled;
            }
            if let Some(minutes) = args.interval {
                config.settings.set_interval(minutes);
                if config.settings.auto_sync_interval != minutes {
                    eprintln!(
                        "note: interval clamped to {} minutes (allowed {}-{})",
                        config.settings.auto_sync_interval,
                        types::MIN_INTERVAL_MINUTES,
                        types::MAX_INTERVAL_MINUTES
                    );
                }
            }

            settings::save_at(&home, &config)
                .with_context(|| format!("failed to save settings for '{}'", config.name))?;
            super::notify_daemon(&home);

            println!("✓ Updated settings for vault '{}'", config.name);
            if let Some(warning) = settings::url_warning(&config.settings) {
                eprintln!("{}", warning.yellow());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigJson {
    name: String,
    path: String,
    branch: String,
    git_url: String,
    auto_sync_enabled: bool,
    auto_sync_interval: u32,
    last_sync_time: i64,
}

impl From<&VaultConfig> for ConfigJson {
    fn from(config: &VaultConfig) -> Self {
        Self {
            name: config.name.to_string(),
            path: config.path.display().to_string(),
            branch: config.branch().to_string(),
            git_url: config.settings.git_url.clone(),
            auto_sync_enabled: config.settings.auto_sync_enabled,
            auto_sync_interval: config.settings.auto_sync_interval,
            last_sync_time: config.settings.last_sync_time,
        }
    }
}

fn print_config(config: &VaultConfig) {
    let s = &config.settings;
    let url = if s.has_url() {
        s.git_url.clone()
    } else {
        "(not set)".dimmed().to_string()
    };
    let auto = if s.auto_sync_enabled {
        format!("every {} minutes", s.auto_sync_interval)
    } else {
        format!("off (interval {} minutes)", s.auto_sync_interval)
    };
    let last = s
        .last_sync_at()
        .map(|at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    println!("{}", config.name.as_str().bold());
    println!("  path:       {}", config.path.display());
    println!("  branch:     {}", config.branch());
    println!("  git url:    {url}");
    println!("  auto sync:  {auto}");
    println!("  last sync:  {last}");
    if let Some(warning) = settings::url_warning(s) {
        println!("  {}", warning.yellow());
    }
}
