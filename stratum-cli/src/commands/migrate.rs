//! Up and down commands - apply and revert migrations

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use serde::Serialize;
use stratum_core::adapters::lock::MigrationLock;
use stratum_core::config::Config;
use stratum_core::ports::CompositeObserver;
use stratum_core::services::BackupService;
use stratum_core::{Direction, LogEvent, MigrationReport, OperationResult, StratumContext};

use super::{get_logger, get_state_dir, is_interactive, log_event, Project};
use crate::output::{self, ProgressObserver};

#[derive(Serialize)]
struct RunOutput {
    #[serde(flatten)]
    report: MigrationReport,
    backup_name: Option<String>,
}

#[derive(Clone, Copy)]
enum Run {
    Up,
    Down,
    DownAll,
}

impl Run {
    fn command(self) -> &'static str {
        match self {
            Run::Up => "up",
            Run::Down => "down",
            Run::DownAll => "down --all",
        }
    }
}

pub fn run_up(project: &Project, skip_backup: bool, json: bool) -> Result<()> {
    execute(project, Run::Up, skip_backup, json)
}

pub fn run_down(project: &Project, all: bool, yes: bool, skip_backup: bool, json: bool) -> Result<()> {
    let config = project.config()?;

    if all && !yes && !json && is_interactive() {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Revert every applied migration in {}?",
                config.database.display()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let run = if all { Run::DownAll } else { Run::Down };
    execute(project, run, skip_backup, json)
}

fn execute(project: &Project, run: Run, skip_backup: bool, json: bool) -> Result<()> {
    let config = project.config()?;

    // Held until the run finishes, backup included
    let _lock = if config.is_in_memory() {
        None
    } else {
        Some(MigrationLock::acquire(&config.database)?)
    };

    let backup_name = if skip_backup {
        None
    } else {
        safety_backup(&config)?
    };

    let mut ctx = project.context(config)?;

    let logger = get_logger(Some(&ctx.config.database));
    log_event(&logger, LogEvent::new("command_executed").with_command(run.command()));

    let progress = ProgressObserver::new(!json);
    let mut observer = CompositeObserver::new().with(&progress);
    if let Some(l) = &logger {
        observer = observer.with(l);
    }

    let result = match run {
        Run::Up => ctx.up(&observer),
        Run::Down => ctx.down(&observer),
        Run::DownAll => ctx.down_all(&observer),
    };
    progress.finish();

    if json {
        let output: OperationResult<RunOutput> = result
            .map(|report| RunOutput { report, backup_name })
            .into();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return match output.error {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        };
    }

    let report = result?;
    print_report(&ctx, &report, backup_name.as_deref());
    Ok(())
}

/// Archive a file database before it is mutated
fn safety_backup(config: &Config) -> Result<Option<String>> {
    if config.is_in_memory() {
        return Ok(None);
    }
    let state_dir = get_state_dir()?;
    let backup = BackupService::new(&state_dir, &config.database)
        .create(Some(config.max_backups))
        .context("Failed to create safety backup")?;
    Ok(backup.map(|b| b.name))
}

fn print_report(ctx: &StratumContext, report: &MigrationReport, backup_name: Option<&str>) {
    if let Some(name) = backup_name {
        println!("Safety backup: {}", name.dimmed());
    }

    if report.is_empty() {
        output::info(&format!(
            "Database is up to date ({} applied)",
            report.untouched
        ));
        return;
    }

    let verb = match report.direction {
        Direction::Up => "Applied",
        Direction::Down => "Reverted",
    };
    output::success(&format!(
        "{} {} migration(s) on {} in {} ms",
        verb,
        report.migrations.len(),
        ctx.config.database.display(),
        report.elapsed_ms
    ));
}
