//! New command - scaffold an up/down migration pair

use anyhow::{Context, Result};
use chrono::Utc;
use stratum_core::adapters::filesystem::create_migration_files;

use super::Project;
use crate::output;

pub fn run(project: &Project, name: &str, json: bool) -> Result<()> {
    let config = project.config()?;

    let created = create_migration_files(&config.migrations_dir, name, Utc::now())
        .with_context(|| format!("Failed to create migration '{}'", name))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "id": created.id,
                "up": created.up_path.to_string_lossy(),
                "down": created.down_path.to_string_lossy(),
            })
        );
        return Ok(());
    }

    output::success(&format!("Created migration {}", created.id));
    println!("  {}", created.up_path.display());
    println!("  {}", created.down_path.display());

    Ok(())
}
