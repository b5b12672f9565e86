//! Migration files on disk
//!
//! A migration directory holds one pair of files per migration:
//!
//! ```text
//! 20240315093000_add_vendor_images.up.sql
//! 20240315093000_add_vendor_images.down.sql
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::duckdb::validate_sql_syntax;
use crate::domain::result::{MigrationError, Result};
use crate::domain::{Direction, Migration, MigrationId, MigrationSet};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

/// Version format used by `create_migration_files`
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Default)]
struct FilePair {
    up: Option<String>,
    down: Option<String>,
}

/// Load every migration in `dir`
///
/// With `validate_sql`, each file is parsed before anything runs so a typo
/// in a late migration cannot leave the database half migrated.
pub fn load_migrations(dir: &Path, validate_sql: bool) -> Result<MigrationSet> {
    if !dir.is_dir() {
        return Err(MigrationError::configuration(format!(
            "Migrations directory not found: {}",
            dir.display()
        )));
    }

    let mut pairs: BTreeMap<String, FilePair> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(".sql") {
            continue;
        }

        let (id, direction) = if let Some(id) = file_name.strip_suffix(UP_SUFFIX) {
            (id, Direction::Up)
        } else if let Some(id) = file_name.strip_suffix(DOWN_SUFFIX) {
            (id, Direction::Down)
        } else {
            return Err(MigrationError::configuration(format!(
                "Unrecognized migration file '{}': expected <id>{} or <id>{}",
                file_name, UP_SUFFIX, DOWN_SUFFIX
            )));
        };

        let sql = fs::read_to_string(&path)?;
        if validate_sql {
            validate_sql_syntax(&sql).map_err(|e| {
                MigrationError::configuration(format!(
                    "Invalid SQL in {} ({}): {}",
                    id, direction, e
                ))
            })?;
        }

        let pair = pairs.entry(id.to_string()).or_default();
        match direction {
            Direction::Up => pair.up = Some(sql),
            Direction::Down => pair.down = Some(sql),
        }
    }

    let mut migrations = Vec::with_capacity(pairs.len());
    for (id, pair) in pairs {
        match (pair.up, pair.down) {
            (Some(up), Some(down)) => migrations.push(Migration::sql(&id, up, down)?),
            (Some(_), None) => {
                return Err(MigrationError::configuration(format!(
                    "Migration {} is missing {}{}",
                    id, id, DOWN_SUFFIX
                )))
            }
            (None, _) => {
                return Err(MigrationError::configuration(format!(
                    "Migration {} is missing {}{}",
                    id, id, UP_SUFFIX
                )))
            }
        }
    }

    MigrationSet::new(migrations)
}

/// Paths written by `create_migration_files`
#[derive(Debug, Clone)]
pub struct CreatedMigration {
    pub id: MigrationId,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Write an empty up/down pair stamped with `now`
///
/// `name` is normalised to lower snake case. Existing files are never
/// overwritten.
pub fn create_migration_files(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<CreatedMigration> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(MigrationError::configuration(format!(
            "Migration name '{}' has no usable characters",
            name
        )));
    }

    let raw_id = format!("{}_{}", now.format(TIMESTAMP_FORMAT), slug);
    let id = MigrationId::parse(&raw_id)?;

    fs::create_dir_all(dir)?;
    let up_path = dir.join(format!("{}{}", raw_id, UP_SUFFIX));
    let down_path = dir.join(format!("{}{}", raw_id, DOWN_SUFFIX));

    if up_path.exists() || down_path.exists() {
        return Err(MigrationError::configuration(format!(
            "Migration {} already exists",
            raw_id
        )));
    }

    fs::write(&up_path, format!("-- {}: apply\n", raw_id))?;
    fs::write(&down_path, format!("-- {}: revert\n", raw_id))?;

    Ok(CreatedMigration {
        id,
        up_path,
        down_path,
    })
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
