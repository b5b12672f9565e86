//! Service layer - business logic orchestration
//!
//! The migration runner plus the services that surround a run: backups
//! before it, event logging during it, health checks after it.

pub mod backup;
mod doctor;
pub mod logging;
pub mod migration;

pub use backup::{BackupService, ClearResult};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use logging::{LogEntry, LogEvent, LoggingService};
pub use migration::{
    plan_pending, MigrationReport, MigrationService, MigrationStatus, DEFAULT_TRACKING_TABLE,
};
