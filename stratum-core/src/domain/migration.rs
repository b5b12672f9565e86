//! Migration definitions
//!
//! A migration is a named, ordered unit of schema change with a forward
//! (`up`) and a backward (`down`) action.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use duckdb::Connection;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::result::{MigrationError, Result};

/// `<version>_<name>`, e.g. `20240315093000_add_vendor_images`
fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)_([A-Za-z0-9_]+)$").expect("migration id pattern is valid")
    })
}

/// Direction a migration is run in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique, totally ordered migration identifier
///
/// Ids sort by numeric version first and name second, so `9_a` comes
/// before `10_a` even though it does not lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationId {
    version: u64,
    name: String,
    raw: String,
}

impl MigrationId {
    pub fn parse(raw: &str) -> Result<Self> {
        let captures = id_pattern().captures(raw).ok_or_else(|| {
            MigrationError::configuration(format!(
                "Malformed migration id '{}': expected <version>_<name>",
                raw
            ))
        })?;

        let version = captures[1].parse::<u64>().map_err(|_| {
            MigrationError::configuration(format!(
                "Migration id '{}' has a version that does not fit in 64 bits",
                raw
            ))
        })?;

        Ok(Self {
            version,
            name: captures[2].to_string(),
            raw: raw.to_string(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for MigrationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for MigrationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for MigrationId {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for MigrationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Code run against a database handle
pub type ActionFn = dyn Fn(&Connection) -> anyhow::Result<()> + Send + Sync;

/// Executable body of one direction of a migration
///
/// Actions receive the connection of an open transaction; they must not
/// commit or roll back themselves.
#[derive(Clone)]
pub enum Action {
    /// SQL batch executed as-is
    Sql(String),
    /// Arbitrary code, e.g. data backfills
    Code(Arc<ActionFn>),
}

impl Action {
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql(sql.into())
    }

    pub fn code<F>(f: F) -> Self
    where
        F: Fn(&Connection) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Code(Arc::new(f))
    }

    pub fn execute(&self, conn: &Connection) -> anyhow::Result<()> {
        match self {
            Action::Sql(sql) => {
                if !is_blank_sql(sql) {
                    conn.execute_batch(sql)?;
                }
                Ok(())
            }
            Action::Code(f) => f(conn),
        }
    }

    pub fn as_sql(&self) -> Option<&str> {
        match self {
            Action::Sql(sql) => Some(sql),
            Action::Code(_) => None,
        }
    }
}

/// Empty or comment-only SQL, e.g. a freshly scaffolded migration file
fn is_blank_sql(sql: &str) -> bool {
    sql.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Action::Code(_) => f.write_str("Code(..)"),
        }
    }
}

/// A migration definition
#[derive(Debug, Clone)]
pub struct Migration {
    id: MigrationId,
    up: Action,
    down: Action,
}

impl Migration {
    pub fn new(id: &str, up: Action, down: Action) -> Result<Self> {
        Ok(Self {
            id: MigrationId::parse(id)?,
            up,
            down,
        })
    }

    /// Shorthand for a migration with SQL in both directions
    pub fn sql(id: &str, up: impl Into<String>, down: impl Into<String>) -> Result<Self> {
        Self::new(id, Action::sql(up), Action::sql(down))
    }

    pub fn id(&self) -> &MigrationId {
        &self.id
    }

    /// Human readable description derived from the id name
    pub fn description(&self) -> String {
        self.id.name().replace('_', " ")
    }

    pub fn up(&self) -> &Action {
        &self.up
    }

    pub fn down(&self) -> &Action {
        &self.down
    }

    pub fn action(&self, direction: Direction) -> &Action {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// SHA-256 over both SQL bodies, hex encoded
    ///
    /// Code actions have no stable text, so they yield `None`.
    pub fn checksum(&self) -> Option<String> {
        let up = self.up.as_sql()?;
        let down = self.down.as_sql()?;

        let mut hasher = Sha256::new();
        hasher.update(up.as_bytes());
        hasher.update([0u8]);
        hasher.update(down.as_bytes());
        Some(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = MigrationId::parse("20240315093000_add_vendor_images").unwrap();
        assert_eq!(id.version(), 20240315093000);
        assert_eq!(id.name(), "add_vendor_images");
        assert_eq!(id.to_string(), "20240315093000_add_vendor_images");
    }

    #[test]
    fn test_malformed_ids_are_configuration_errors() {
        for raw in ["", "add_table", "123", "123_", "123_add-table", "abc_123", "99999999999999999999_x"] {
            let err = MigrationId::parse(raw).unwrap_err();
            assert!(
                matches!(err, MigrationError::Configuration(_)),
                "expected configuration error for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_ids_order_numerically() {
        let nine = MigrationId::parse("9_a").unwrap();
        let ten = MigrationId::parse("10_a").unwrap();
        assert!(nine < ten);

        let a = MigrationId::parse("5_alpha").unwrap();
        let b = MigrationId::parse("5_beta").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_checksum_tracks_sql_text() {
        let first = Migration::sql("1_create", "CREATE TABLE t (a INT);", "DROP TABLE t;").unwrap();
        let same = Migration::sql("1_create", "CREATE TABLE t (a INT);", "DROP TABLE t;").unwrap();
        let edited = Migration::sql("1_create", "CREATE TABLE t (a BIGINT);", "DROP TABLE t;").unwrap();

        assert_eq!(first.checksum(), same.checksum());
        assert_ne!(first.checksum(), edited.checksum());
        assert_eq!(first.checksum().unwrap().len(), 64);
    }

    #[test]
    fn test_code_actions_have_no_checksum() {
        let migration = Migration::new(
            "1_backfill",
            Action::code(|conn| {
                conn.execute_batch("SELECT 1")?;
                Ok(())
            }),
            Action::sql(""),
        )
        .unwrap();
        assert!(migration.checksum().is_none());
        assert_eq!(migration.description(), "backfill");
    }

    #[test]
    fn test_empty_sql_action_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        Action::sql("   \n").execute(&conn).unwrap();
        Action::sql("-- 20240101000000_scaffold: apply\n").execute(&conn).unwrap();
    }
}
