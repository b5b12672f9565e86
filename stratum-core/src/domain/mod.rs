//! Core domain types
//!
//! Migration definitions, tracking entries and errors. These are plain
//! data structures; all database access lives in the services.

mod applied;
mod backup;
pub mod migration;
mod migration_set;
pub mod result;

pub use applied::AppliedMigration;
pub use backup::BackupMetadata;
pub use migration::{Action, Direction, Migration, MigrationId};
pub use migration_set::MigrationSet;
