//! Log database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! Each migration is a tuple of (id, up_sql, down_sql) and is applied by
//! the same engine that migrates user databases.

use crate::domain::result::Result;
use crate::domain::MigrationSet;

/// Tracking table for the log database
pub const LOG_TRACKING_TABLE: &str = "sys_log_migrations";

/// All log migrations, embedded at compile time.
///
/// IMPORTANT: When adding a new migration:
/// 1. Create <timestamp>_<name>.up.sql and .down.sql
/// 2. Add an entry here
pub const LOG_MIGRATIONS: &[(&str, &str, &str)] = &[
    (
        "20250101000000_create_sys_logs",
        include_str!("20250101000000_create_sys_logs.up.sql"),
        include_str!("20250101000000_create_sys_logs.down.sql"),
    ),
    (
        "20250201000000_add_migration_context",
        include_str!("20250201000000_add_migration_context.up.sql"),
        include_str!("20250201000000_add_migration_context.down.sql"),
    ),
];

pub fn migration_set() -> Result<MigrationSet> {
    MigrationSet::from_sql(LOG_MIGRATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::validate_sql_syntax;

    #[test]
    fn test_log_migrations_are_valid() {
        let set = migration_set().unwrap();
        assert_eq!(set.len(), LOG_MIGRATIONS.len());
        for (id, up, down) in LOG_MIGRATIONS {
            assert!(validate_sql_syntax(up).is_ok(), "{} up", id);
            assert!(validate_sql_syntax(down).is_ok(), "{} down", id);
        }
    }
}
