//! CLI command implementations

pub mod backup;
pub mod doctor;
pub mod init;
pub mod logs;
pub mod migrate;
pub mod new;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stratum_core::config::Config;
use stratum_core::{LogEvent, LoggingService, StratumContext};

/// Project location plus the command line overrides
pub struct Project {
    pub dir: PathBuf,
    pub database: Option<PathBuf>,
    pub migrations: Option<PathBuf>,
}

impl Project {
    /// Resolved configuration: flags beat env vars beat stratum.json
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load(&self.dir)
            .with_context(|| format!("Failed to load config from {}", self.dir.display()))?;

        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(migrations) = &self.migrations {
            config.migrations_dir = migrations.clone();
        }

        Ok(config)
    }

    /// Load the migration definitions and open the database
    pub fn context(&self, config: Config) -> Result<StratumContext> {
        Ok(StratumContext::new(&self.dir, config)?)
    }
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger(database: Option<&Path>) -> Option<LoggingService> {
    let state_dir = get_state_dir().ok()?;
    std::fs::create_dir_all(&state_dir).ok()?;
    let logger = LoggingService::new(&state_dir, env!("CARGO_PKG_VERSION")).ok()?;
    Some(match database {
        Some(path) => logger.for_database(path),
        None => logger,
    })
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the state directory (logs, backups) from environment or default
pub fn get_state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("STRATUM_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".stratum"))
}

/// Whether prompts can be shown
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin)
}
