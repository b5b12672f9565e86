//! Init command - write stratum.json and the migrations directory

use anyhow::{Context, Result};
use stratum_core::config::SETTINGS_FILE;

use super::Project;
use crate::output;

pub fn run(project: &Project, json: bool) -> Result<()> {
    let config = project.config()?;
    let settings_path = project.dir.join(SETTINGS_FILE);
    let existed = settings_path.exists();

    std::fs::create_dir_all(&config.migrations_dir).with_context(|| {
        format!("Failed to create {}", config.migrations_dir.display())
    })?;
    config.save(&project.dir)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "settings": settings_path.to_string_lossy(),
                "migrations_dir": config.migrations_dir.to_string_lossy(),
                "database": config.database.to_string_lossy(),
                "updated": existed,
            })
        );
        return Ok(());
    }

    if existed {
        output::info(&format!("Updated {}", settings_path.display()));
    } else {
        output::success(&format!("Created {}", settings_path.display()));
    }
    println!("  Migrations: {}", config.migrations_dir.display());
    println!("  Database:   {}", config.database.display());
    println!();
    println!("Next: stratum new <name>");

    Ok(())
}
