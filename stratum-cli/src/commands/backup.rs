//! Backup command - manage safety backups of the database

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use stratum_core::adapters::lock::MigrationLock;
use stratum_core::services::BackupService;

use super::{get_state_dir, Project};
use crate::output;

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Maximum number of backups to keep
        #[arg(long, short = 'm')]
        max_backups: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available backups
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore the database from a backup
    Restore {
        /// Backup name to restore
        name: String,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear all backups
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn confirm(prompt: String) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

pub fn run(project: &Project, command: BackupCommands) -> Result<()> {
    let config = project.config()?;
    if config.is_in_memory() {
        bail!("In-memory databases have no backups");
    }
    let service = BackupService::new(&get_state_dir()?, &config.database);

    match command {
        BackupCommands::Create { max_backups, json } => {
            let _lock = MigrationLock::acquire(&config.database)?;
            let result = service
                .create(max_backups.or(Some(config.max_backups)))?
                .with_context(|| format!("Database {} does not exist", config.database.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                output::success("Backup created");
                println!("  Name: {}", result.name);
                println!("  Size: {}", result.size_display());
            }
        }
        BackupCommands::List { json } => {
            let backups = service.list()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
                return Ok(());
            }

            if backups.is_empty() {
                println!("No backups found in {}", service.backups_dir().display());
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Name", "Created", "Size"]);

            for backup in &backups {
                table.add_row(vec![
                    backup.name.clone(),
                    backup.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    backup.size_display(),
                ]);
            }

            println!("{}", table);
        }
        BackupCommands::Restore { name, force, json } => {
            if !force && !json {
                let prompt = format!(
                    "Replace {} with backup '{}'?",
                    config.database.display(),
                    name
                );
                if !confirm(prompt)? {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            // No runner may hold the database while its file is replaced
            let _lock = MigrationLock::acquire(&config.database)?;
            service.restore(&name)?;

            if json {
                println!("{}", serde_json::json!({"restored": name}));
            } else {
                println!("Database restored from backup: {}", name.green());
            }
        }
        BackupCommands::Clear { force, json } => {
            if !force && !json && !confirm("Delete all backups?".to_string())? {
                println!("Cancelled.");
                return Ok(());
            }

            let result = service.clear()?;
            if json {
                println!("{}", serde_json::json!({"deleted": result.deleted}));
            } else {
                println!("Deleted {} backup(s)", result.deleted);
            }
        }
    }

    Ok(())
}
