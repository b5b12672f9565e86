//! Configuration management
//!
//! Project settings live in `stratum.json` next to the migrations:
//! ```json
//! {
//!   "database": "app.duckdb",
//!   "migrationsDir": "migrations",
//!   "trackingTable": "schema_migrations",
//!   "allowOutOfOrder": false,
//!   "validateSql": true,
//!   "maxBackups": 10
//! }
//! ```
//! Relative paths resolve against the project directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::duckdb::IN_MEMORY;
use crate::services::migration::DEFAULT_TRACKING_TABLE;

/// Name of the settings file inside the project directory
pub const SETTINGS_FILE: &str = "stratum.json";

const DEFAULT_DATABASE: &str = "stratum.duckdb";
const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
const DEFAULT_MAX_BACKUPS: usize = 10;

/// Raw stratum.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    migrations_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tracking_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_out_of_order: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validate_sql: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_backups: Option<usize>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Resolved project configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: PathBuf,
    pub migrations_dir: PathBuf,
    pub tracking_table: String,
    pub allow_out_of_order: bool,
    pub validate_sql: bool,
    pub max_backups: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            tracking_table: DEFAULT_TRACKING_TABLE.to_string(),
            allow_out_of_order: false,
            validate_sql: true,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

/// Parse a boolean environment value; unrecognised values are ignored
fn parse_env_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "TRUE" | "YES" => Some(true),
        "false" | "0" | "no" | "FALSE" | "NO" => Some(false),
        _ => None,
    }
}

fn resolve(project_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if value == IN_MEMORY || path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

impl Config {
    /// Load config from a project directory
    ///
    /// Environment overrides (for CI and scripts):
    /// - STRATUM_DATABASE
    /// - STRATUM_MIGRATIONS_DIR
    /// - STRATUM_ALLOW_OUT_OF_ORDER
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = project_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let defaults = Config::default();

        let database = std::env::var("STRATUM_DATABASE")
            .ok()
            .or(raw.database)
            .map(|d| resolve(project_dir, &d))
            .unwrap_or_else(|| project_dir.join(defaults.database));

        let migrations_dir = std::env::var("STRATUM_MIGRATIONS_DIR")
            .ok()
            .or(raw.migrations_dir)
            .map(|d| resolve(project_dir, &d))
            .unwrap_or_else(|| project_dir.join(defaults.migrations_dir));

        let allow_out_of_order = std::env::var("STRATUM_ALLOW_OUT_OF_ORDER")
            .ok()
            .and_then(|v| parse_env_bool(&v))
            .or(raw.allow_out_of_order)
            .unwrap_or(defaults.allow_out_of_order);

        Ok(Self {
            database,
            migrations_dir,
            tracking_table: raw.tracking_table.unwrap_or(defaults.tracking_table),
            allow_out_of_order,
            validate_sql: raw.validate_sql.unwrap_or(defaults.validate_sql),
            max_backups: raw.max_backups.unwrap_or(defaults.max_backups),
        })
    }

    /// Save config to a project directory
    ///
    /// Preserves keys that stratum does not manage.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let settings_path = project_dir.join(SETTINGS_FILE);

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        settings.database = Some(relative_to(project_dir, &self.database));
        settings.migrations_dir = Some(relative_to(project_dir, &self.migrations_dir));
        settings.tracking_table = Some(self.tracking_table.clone());
        settings.allow_out_of_order = Some(self.allow_out_of_order);
        settings.validate_sql = Some(self.validate_sql);
        settings.max_backups = Some(self.max_backups);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.as_os_str() == IN_MEMORY
    }
}

fn relative_to(project_dir: &Path, path: &Path) -> String {
    path.strip_prefix(project_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
