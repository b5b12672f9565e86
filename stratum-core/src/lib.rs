//! Stratum Core - dependency-ordered schema migrations for DuckDB
//!
//! This crate follows hexagonal architecture:
//!
//! - **domain**: migration definitions, tracking entries, errors
//! - **ports**: traits the engine calls out through (observers)
//! - **services**: the migration runner and its supporting services
//! - **adapters**: DuckDB, migration files on disk, the advisory lock

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};

use adapters::duckdb::DuckDbDatabase;
use config::Config;
use services::DoctorResult;

// Re-export commonly used types at crate root
pub use domain::result::{MigrationError, OperationResult, Result};
pub use domain::{Action, AppliedMigration, Direction, Migration, MigrationId, MigrationSet};
pub use ports::{MigrationEvent, MigrationObserver};
pub use services::{
    plan_pending, DoctorService, LogEntry, LogEvent, LoggingService, MigrationReport,
    MigrationService, MigrationStatus,
};

/// Main context for Stratum operations
///
/// Holds the resolved configuration, the migration definitions and the
/// open target database. Each operation builds a fresh runner, so the
/// tracking table is re-read every time.
pub struct StratumContext {
    pub project_dir: PathBuf,
    pub config: Config,
    pub migrations: MigrationSet,
    pub database: DuckDbDatabase,
}

impl StratumContext {
    /// Load the migration definitions and open the database
    pub fn new(project_dir: &Path, config: Config) -> Result<Self> {
        let migrations =
            adapters::filesystem::load_migrations(&config.migrations_dir, config.validate_sql)?;
        let database = DuckDbDatabase::open(&config.database)?;

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config,
            migrations,
            database,
        })
    }

    /// Use an explicit migration set instead of the migrations directory
    pub fn with_migrations(project_dir: &Path, config: Config, migrations: MigrationSet) -> Result<Self> {
        let database = DuckDbDatabase::open(&config.database)?;
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config,
            migrations,
            database,
        })
    }

    fn runner<'a>(
        database: &'a mut DuckDbDatabase,
        config: &Config,
        observer: &'a dyn MigrationObserver,
    ) -> Result<MigrationService<'a>> {
        Ok(MigrationService::new(database.connection_mut())
            .with_tracking_table(&config.tracking_table)?
            .allow_out_of_order(config.allow_out_of_order)
            .with_observer(observer))
    }

    /// Apply all pending migrations (`stratum up`)
    pub fn up(&mut self, observer: &dyn MigrationObserver) -> Result<MigrationReport> {
        Self::runner(&mut self.database, &self.config, observer)?.run_pending(&self.migrations)
    }

    /// Revert the newest applied migration (`stratum down`)
    pub fn down(&mut self, observer: &dyn MigrationObserver) -> Result<MigrationReport> {
        Self::runner(&mut self.database, &self.config, observer)?.revert_last(&self.migrations)
    }

    /// Revert every applied migration (`stratum down --all`)
    pub fn down_all(&mut self, observer: &dyn MigrationObserver) -> Result<MigrationReport> {
        Self::runner(&mut self.database, &self.config, observer)?.revert_all(&self.migrations)
    }

    /// Applied vs pending migrations (`stratum status`)
    pub fn status(&mut self) -> Result<MigrationStatus> {
        let observer = ports::NoopObserver;
        Self::runner(&mut self.database, &self.config, &observer)?.status(&self.migrations)
    }

    /// Tracking table health checks (`stratum doctor`)
    pub fn doctor(&mut self) -> Result<DoctorResult> {
        let observer = ports::NoopObserver;
        let runner = Self::runner(&mut self.database, &self.config, &observer)?;
        let status = runner.status(&self.migrations)?;
        let exists = runner.tracking_table_exists()?;
        DoctorService::new(&self.migrations).run_checks(&status, exists)
    }
}
