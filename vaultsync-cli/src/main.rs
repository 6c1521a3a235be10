//! vaultsync: keep note vaults in sync with a git remote.
//!
//! # Usage
//!
//! ```text
//! vaultsync init [PATH] [--url URL] [--auto-sync] [--interval MIN]
//! vaultsync config show [--vault V] [--json]
//! vaultsync config set [--vault V] [--url URL] [--auto-sync true|false] [--interval MIN]
//! vaultsync sync [--vault V] [--path P] [--daemon]
//! vaultsync branches [--vault V] [--url URL]
//! vaultsync clone [--branch B] [--vault V] [--url URL]
//! vaultsync status [--json]
//! vaultsync daemon start|stop|status|reload|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{
    clone::{BranchesArgs, CloneArgs},
    config::ConfigCommand,
    daemon::DaemonCommand,
    init::InitArgs,
    status::StatusArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "vaultsync",
    version,
    about = "Sync note vaults with a git remote",
    long_about = None,
)]
struct Cli {
    /// Log git invocations (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a vault directory.
    Init(InitArgs),

    /// Show or change a vault's sync settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Pull, commit and push a vault, or commit and push one file or folder.
    Sync(SyncArgs),

    /// List the branches of the remote repository.
    Branches(BranchesArgs),

    /// Clone a remote branch into the vault directory.
    Clone(CloneArgs),

    /// Show every registered vault and when it last synced.
    Status(StatusArgs),

    /// Run and control the background auto-sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The daemon installs its own tracing subscriber, which also captures
    // `log` records; a second global logger would steal them.
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        init_logging(cli.verbose);
    }

    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Branches(args) => args.run(),
        Commands::Clone(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .format_timestamp(None)
        .try_init();
}
