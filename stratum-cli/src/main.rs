//! Stratum CLI - schema migrations for DuckDB

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod output;

use commands::{backup, doctor, init, logs, migrate, new, status, Project};

/// Stratum - dependency-ordered schema migrations
#[derive(Parser)]
#[command(name = "stratum", version, about, long_about = None)]
struct Cli {
    /// Project directory containing stratum.json
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Database file (overrides stratum.json and STRATUM_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Migrations directory (overrides stratum.json and STRATUM_MIGRATIONS_DIR)
    #[arg(long, global = true)]
    migrations: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write stratum.json and create the migrations directory
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply all pending migrations
    Up {
        /// Skip creating safety backup
        #[arg(long)]
        skip_backup: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Revert the newest applied migration
    Down {
        /// Revert every applied migration
        #[arg(long)]
        all: bool,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Skip creating safety backup
        #[arg(long)]
        skip_backup: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new timestamped migration pair
    New {
        /// Migration name, e.g. "add vendor images"
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run tracking table health checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },

    /// Manage safety backups
    Backup {
        #[command(subcommand)]
        command: backup::BackupCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let project = Project {
        dir: cli.dir,
        database: cli.database,
        migrations: cli.migrations,
    };

    match cli.command {
        Commands::Init { json } => init::run(&project, json),
        Commands::Up { skip_backup, json } => migrate::run_up(&project, skip_backup, json),
        Commands::Down { all, yes, skip_backup, json } => {
            migrate::run_down(&project, all, yes, skip_backup, json)
        }
        Commands::Status { json } => status::run(&project, json),
        Commands::New { name, json } => new::run(&project, &name, json),
        Commands::Doctor { verbose, json } => doctor::run(&project, verbose, json),
        Commands::Logs { command } => logs::run(command),
        Commands::Backup { command } => backup::run(&project, command),
    }
}
