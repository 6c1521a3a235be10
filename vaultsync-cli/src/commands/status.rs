//! `vaultsync status`: every registered vault and its last sync.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use vaultsync_core::{settings, VaultConfig};
use vaultsync_daemon::{send_request, DaemonRequest};

/// Arguments for `vaultsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let vaults = settings::list_at(&home).context("failed to load vault settings")?;
        let daemon = daemon_status(&home);

        if self.json {
            print_json(&vaults, daemon.as_ref())?;
        } else {
            print_table(&vaults, daemon.as_ref());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson {
    daemon_running: bool,
    vaults: Vec<VaultStatusJson>,
}

#[derive(Serialize)]
struct VaultStatusJson {
    name: String,
    path: String,
    branch: String,
    git_url: String,
    auto_sync: bool,
    interval_minutes: u32,
    last_sync_at: Option<String>,
    last_sync_age: String,
    last_result: Option<Value>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "")]
    indicator: String,
    #[tabled(rename = "vault")]
    vault: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "auto sync")]
    auto_sync: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

/// Status payload of a running daemon; no retry, a stopped daemon is `None`.
fn daemon_status(home: &Path) -> Option<Value> {
    let response = send_request(home, &DaemonRequest::new("status")).ok()?;
    if response.ok {
        response.data
    } else {
        None
    }
}

/// Last result the daemon recorded for `vault`, if any.
fn daemon_result(daemon: Option<&Value>, vault: &str) -> Option<Value> {
    daemon?
        .get("vaults")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("name").and_then(Value::as_str) == Some(vault))?
        .get("last_result")
        .filter(|result| !result.is_null())
        .cloned()
}

fn print_json(vaults: &[VaultConfig], daemon: Option<&Value>) -> Result<()> {
    let payload = StatusJson {
        daemon_running: daemon.is_some(),
        vaults: vaults
            .iter()
            .map(|config| {
                let last = config.settings.last_sync_at();
                VaultStatusJson {
                    name: config.name.to_string(),
                    path: config.path.display().to_string(),
                    branch: config.branch().to_string(),
                    git_url: config.settings.git_url.clone(),
                    auto_sync: config.settings.auto_sync_enabled,
                    interval_minutes: config.settings.auto_sync_interval,
                    last_sync_at: last.map(|at| at.to_rfc3339()),
                    last_sync_age: last_sync_age(last),
                    last_result: daemon_result(daemon, config.name.as_str()),
                }
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(vaults: &[VaultConfig], daemon: Option<&Value>) {
    let daemon_label = if daemon.is_some() {
        "daemon running".green().to_string()
    } else {
        "daemon stopped".bright_black().to_string()
    };
    println!(
        "vaultsync v{} | {} vaults | {}",
        env!("CARGO_PKG_VERSION"),
        vaults.len(),
        daemon_label,
    );

    if vaults.is_empty() {
        println!("No vaults registered. Run 'vaultsync init' inside a vault.");
        return;
    }

    let rows: Vec<StatusTableRow> = vaults
        .iter()
        .map(|config| {
            let s = &config.settings;
            let failed = daemon_result(daemon, config.name.as_str())
                .and_then(|result| result.get("ok").and_then(Value::as_bool))
                == Some(false);
            StatusTableRow {
                indicator: indicator(config, failed),
                vault: config.name.to_string(),
                branch: config.branch().to_string(),
                remote: if s.has_url() {
                    s.git_url.clone()
                } else {
                    "(not set)".to_string()
                },
                auto_sync: if s.auto_sync_enabled {
                    format!("every {}m", s.auto_sync_interval)
                } else {
                    "off".to_string()
                },
                last_sync: last_sync_age(s.last_sync_at()),
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if vaults.iter().any(|config| !config.settings.has_url()) {
        println!("Set a remote with 'vaultsync config set --vault <name> --url <url>'.");
    }
}

fn indicator(config: &VaultConfig, failed: bool) -> String {
    if !config.settings.has_url() {
        "■".bright_black().bold().to_string()
    } else if failed {
        "■".red().bold().to_string()
    } else if config.settings.last_sync_at().is_none() {
        "■".yellow().bold().to_string()
    } else {
        "■".green().bold().to_string()
    }
}

fn last_sync_age(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => format!("{} ago", format_age(at, Utc::now())),
        None => "never".to_string(),
    }
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(at).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 60 * 60 => format!("{}m", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h", s / (60 * 60)),
        s => format!("{}d", s / (60 * 60 * 24)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn format_age_picks_the_largest_whole_unit() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(42), now), "42s");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h");
        assert_eq!(format_age(now - Duration::days(2), now), "2d");
        assert_eq!(format_age(now + Duration::seconds(10), now), "0s");
    }

    #[test]
    fn daemon_result_finds_the_vault_entry() {
        let payload = json!({
            "running": true,
            "vaults": [
                {"name": "notes", "last_result": {"ok": false, "message": "boom"}},
                {"name": "work", "last_result": null},
            ],
        });
        let notes = daemon_result(Some(&payload), "notes").unwrap();
        assert_eq!(notes["ok"], json!(false));
        assert!(daemon_result(Some(&payload), "work").is_none());
        assert!(daemon_result(Some(&payload), "missing").is_none());
        assert!(daemon_result(None, "notes").is_none());
    }
}
