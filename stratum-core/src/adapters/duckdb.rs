//! DuckDB database adapter

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use duckdb::Connection;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;

use crate::domain::result::{MigrationError, Result};
use crate::services::MigrationService;

/// Path value that selects an in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Validate SQL syntax before execution to catch malformed migrations early.
pub fn validate_sql_syntax(sql: &str) -> std::result::Result<(), String> {
    let dialect = DuckDbDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| {
        let msg = e.to_string();
        msg.trim_start_matches("sql parser error: ").to_string()
    })?;
    Ok(())
}

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// Target database of a migration run
pub struct DuckDbDatabase {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl DuckDbDatabase {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file, then gives up with a connection error.
    pub fn open(db_path: &Path) -> Result<Self> {
        if db_path.as_os_str() == IN_MEMORY {
            return Self::in_memory();
        }

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn,
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[stratum] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(err_msg);
                        continue;
                    }
                    return Err(MigrationError::connection(format!(
                        "Failed to open {}: {}",
                        db_path.display(),
                        err_msg
                    )));
                }
            }
        }

        Err(MigrationError::connection(format!(
            "Failed to open {} after {} retries: {}",
            db_path.display(),
            MAX_RETRIES,
            last_error.unwrap_or_default()
        )))
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let config = Self::base_config().map_err(connection_error)?;
        let conn = Connection::open_in_memory_with_flags(config).map_err(connection_error)?;
        Ok(Self { conn, db_path: None })
    }

    fn base_config() -> duckdb::Result<duckdb::Config> {
        // Extension autoloading pulls cached binaries from ~/.duckdb; migrations never need it
        duckdb::Config::default().enable_autoload_extension(false)
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        let config = Self::base_config()?;
        Connection::open_with_flags(db_path, config)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Runner bound to this database with the default tracking table
    pub fn migration_service(&mut self) -> MigrationService<'_> {
        MigrationService::new(&mut self.conn)
    }

    /// Check whether a table exists in the current schema
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        table_exists(&self.conn, table)
    }
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn connection_error(e: duckdb::Error) -> MigrationError {
    MigrationError::connection(e.to_string())
}
