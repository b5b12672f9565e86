//! Status command - show applied and pending migrations

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};

use super::Project;
use crate::output;

pub fn run(project: &Project, json: bool) -> Result<()> {
    let mut ctx = project.context(project.config()?)?;
    let status = ctx.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Migration Status".bold());
    println!("Database: {}", ctx.config.database.display());
    println!("Tracking table: {}", status.tracking_table);
    println!();

    if status.applied.is_empty() && status.pending.is_empty() {
        println!("No migrations defined in {}", ctx.config.migrations_dir.display());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Migration", "State", "Applied At", "Duration"]);

    for entry in &status.applied {
        let state = if status.unknown.contains(&entry.id) {
            Cell::new("unknown").fg(Color::Red)
        } else if status.modified.contains(&entry.id) {
            Cell::new("modified").fg(Color::Yellow)
        } else {
            Cell::new("applied").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(entry.id.as_str()),
            state,
            Cell::new(entry.applied_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(format!("{} ms", entry.duration_ms)),
        ]);
    }

    for id in &status.pending {
        table.add_row(vec![
            Cell::new(id.as_str()),
            Cell::new("pending").fg(Color::Cyan),
            Cell::new(""),
            Cell::new(""),
        ]);
    }

    println!("{}", table);
    println!();

    if status.is_up_to_date() {
        output::success(&format!("Up to date ({} applied)", status.applied.len()));
    } else {
        output::warning(&format!(
            "{} applied, {} pending",
            status.applied.len(),
            status.pending.len()
        ));
    }

    if !status.unknown.is_empty() {
        output::warning("Some applied migrations have no definition; run `stratum doctor` for details");
    }

    Ok(())
}
