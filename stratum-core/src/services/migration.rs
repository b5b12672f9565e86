//! Migration service - applies and reverts schema migrations
//!
//! Every migration runs in its own transaction together with the write to
//! the tracking table, so a migration is either fully applied and recorded
//! or not at all. The tracking table is re-read on every call; nothing
//! about the schema state is cached in process.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use regex::Regex;
use serde::Serialize;

use crate::adapters::duckdb::table_exists;
use crate::domain::result::{MigrationError, Result};
use crate::domain::{AppliedMigration, Direction, Migration, MigrationId, MigrationSet};
use crate::ports::{MigrationEvent, MigrationObserver, NoopObserver};

/// Tracking table used when none is configured
pub const DEFAULT_TRACKING_TABLE: &str = "schema_migrations";

static NOOP_OBSERVER: NoopObserver = NoopObserver;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
    })
}

/// Migrations in `all` whose id is not in `applied`, ascending by id
pub fn plan_pending<'m>(all: &'m [Migration], applied: &HashSet<MigrationId>) -> Vec<&'m Migration> {
    let mut pending: Vec<&Migration> = all.iter().filter(|m| !applied.contains(m.id())).collect();
    pending.sort_by(|a, b| a.id().cmp(b.id()));
    pending
}

/// Outcome of an apply or revert call
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub direction: Direction,
    /// Ids run by this call, in execution order
    pub migrations: Vec<String>,
    /// Applied migrations left untouched by this call
    pub untouched: usize,
    pub elapsed_ms: u128,
}

impl MigrationReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            migrations: Vec::new(),
            untouched: 0,
            elapsed_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Applied vs pending view of a project
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub tracking_table: String,
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<MigrationId>,
    /// Recorded as applied but no longer defined
    pub unknown: Vec<MigrationId>,
    /// Applied with a checksum that no longer matches the definition
    pub modified: Vec<MigrationId>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Service for applying and reverting migrations against one connection
///
/// At most one runner may operate on a database at a time; callers
/// serialize runs with `MigrationLock`.
pub struct MigrationService<'a> {
    conn: &'a mut Connection,
    tracking_table: String,
    allow_out_of_order: bool,
    observer: &'a dyn MigrationObserver,
}

impl<'a> MigrationService<'a> {
    /// Create a new migration service with a database connection
    pub fn new(conn: &'a mut Connection) -> Self {
        Self {
            conn,
            tracking_table: DEFAULT_TRACKING_TABLE.to_string(),
            allow_out_of_order: false,
            observer: &NOOP_OBSERVER,
        }
    }

    /// Use a different tracking table
    pub fn with_tracking_table(mut self, table: &str) -> Result<Self> {
        if !identifier_pattern().is_match(table) {
            return Err(MigrationError::configuration(format!(
                "Invalid tracking table name '{}'",
                table
            )));
        }
        self.tracking_table = table.to_string();
        Ok(self)
    }

    /// Permit applying a pending migration older than the newest applied one
    pub fn allow_out_of_order(mut self, allow: bool) -> Self {
        self.allow_out_of_order = allow;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn MigrationObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn tracking_table(&self) -> &str {
        &self.tracking_table
    }

    /// Create the tracking table if it does not exist
    pub fn ensure_tracking_table(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR PRIMARY KEY,
                applied_at BIGINT NOT NULL,
                checksum VARCHAR,
                duration_ms BIGINT NOT NULL
            )",
            self.tracking_table
        ))?;
        Ok(())
    }

    pub fn tracking_table_exists(&self) -> Result<bool> {
        table_exists(self.conn, &self.tracking_table)
    }

    /// Get applied migrations, ascending by id
    pub fn get_applied(&self) -> Result<Vec<AppliedMigration>> {
        if !self.tracking_table_exists()? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, applied_at, checksum, duration_ms FROM {}",
            self.tracking_table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut applied = Vec::new();
        for row in rows {
            let (id, applied_at, checksum, duration_ms) = row?;
            let id = MigrationId::parse(&id).map_err(|_| {
                MigrationError::configuration(format!(
                    "Tracking table {} contains malformed id '{}'",
                    self.tracking_table, id
                ))
            })?;
            applied.push(AppliedMigration {
                id,
                applied_at: DateTime::from_timestamp_millis(applied_at).unwrap_or_default(),
                checksum,
                duration_ms,
            });
        }

        applied.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(applied)
    }

    /// Get the set of applied migration ids
    pub fn get_applied_ids(&self) -> Result<HashSet<MigrationId>> {
        Ok(self.get_applied()?.into_iter().map(|a| a.id).collect())
    }

    /// Get pending migrations for `set`, ascending by id
    pub fn get_pending<'m>(&self, set: &'m MigrationSet) -> Result<Vec<&'m Migration>> {
        let applied = self.get_applied_ids()?;
        Ok(plan_pending(set.as_slice(), &applied))
    }

    /// Compare the definitions against the tracking table
    pub fn status(&self, set: &MigrationSet) -> Result<MigrationStatus> {
        let applied = self.get_applied()?;
        let applied_ids: HashSet<MigrationId> = applied.iter().map(|a| a.id.clone()).collect();

        let pending = plan_pending(set.as_slice(), &applied_ids)
            .into_iter()
            .map(|m| m.id().clone())
            .collect();

        let mut unknown = Vec::new();
        let mut modified = Vec::new();
        for entry in &applied {
            match set.get(&entry.id) {
                None => unknown.push(entry.id.clone()),
                Some(migration) => {
                    if let (Some(recorded), Some(current)) = (&entry.checksum, migration.checksum()) {
                        if *recorded != current {
                            modified.push(entry.id.clone());
                        }
                    }
                }
            }
        }

        Ok(MigrationStatus {
            tracking_table: self.tracking_table.clone(),
            applied,
            pending,
            unknown,
            modified,
        })
    }

    /// Run all pending migrations
    ///
    /// Rejects the run up front if a pending migration sorts before the
    /// newest applied one, unless out-of-order runs are allowed.
    pub fn run_pending(&mut self, set: &MigrationSet) -> Result<MigrationReport> {
        let applied = self.get_applied_ids()?;
        let pending = plan_pending(set.as_slice(), &applied);

        if !self.allow_out_of_order {
            if let Some(newest) = applied.iter().max() {
                let stale: Vec<String> = pending
                    .iter()
                    .filter(|m| m.id() < newest)
                    .map(|m| m.id().to_string())
                    .collect();
                if !stale.is_empty() {
                    return Err(MigrationError::sequence(format!(
                        "Pending migration(s) {} are older than the newest applied migration {}",
                        stale.join(", "),
                        newest
                    )));
                }
            }
        }

        let mut report = self.apply_all(&pending)?;
        report.untouched = applied.len();
        Ok(report)
    }

    /// Apply `pending` in order, one transaction per migration
    ///
    /// Stops at the first failure. Migrations committed before it stay
    /// applied; the error names the failing id and how many succeeded.
    pub fn apply_all(&mut self, pending: &[&Migration]) -> Result<MigrationReport> {
        let started = Instant::now();
        let mut report = MigrationReport::new(Direction::Up);

        if pending.is_empty() {
            return Ok(report);
        }

        self.ensure_tracking_table()?;

        for migration in pending {
            self.run_one(migration, Direction::Up, report.migrations.len())?;
            report.migrations.push(migration.id().to_string());
        }

        report.elapsed_ms = started.elapsed().as_millis();
        Ok(report)
    }

    /// Revert the most recently applied migration
    pub fn revert_last(&mut self, set: &MigrationSet) -> Result<MigrationReport> {
        let started = Instant::now();
        let applied = self.get_applied()?;
        let Some(newest) = applied.last() else {
            return Err(MigrationError::sequence("No migrations are applied"));
        };

        let migration = self.definition_for(set, &newest.id)?;
        self.run_one(migration, Direction::Down, 0)?;

        Ok(MigrationReport {
            direction: Direction::Down,
            migrations: vec![migration.id().to_string()],
            untouched: applied.len() - 1,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    /// Revert every applied migration, newest first
    ///
    /// Every applied id must still be defined; this is checked before the
    /// first revert so an unknown entry cannot stop the run halfway.
    pub fn revert_all(&mut self, set: &MigrationSet) -> Result<MigrationReport> {
        let started = Instant::now();
        let applied = self.get_applied()?;
        if applied.is_empty() {
            return Err(MigrationError::sequence("No migrations are applied"));
        }

        let mut to_revert = Vec::with_capacity(applied.len());
        for entry in applied.iter().rev() {
            to_revert.push(self.definition_for(set, &entry.id)?);
        }

        let mut report = MigrationReport::new(Direction::Down);
        for migration in to_revert {
            self.run_one(migration, Direction::Down, report.migrations.len())?;
            report.migrations.push(migration.id().to_string());
        }

        report.elapsed_ms = started.elapsed().as_millis();
        Ok(report)
    }

    fn definition_for<'m>(&self, set: &'m MigrationSet, id: &MigrationId) -> Result<&'m Migration> {
        set.get(id).ok_or_else(|| {
            MigrationError::configuration(format!(
                "Applied migration {} has no definition; cannot revert it",
                id
            ))
        })
    }

    /// Run one direction of a migration and report it to the observer
    fn run_one(&mut self, migration: &Migration, direction: Direction, completed: usize) -> Result<()> {
        let id = migration.id();
        self.observer.on_event(&MigrationEvent::Started { id, direction });

        match self.execute_in_transaction(migration, direction) {
            Ok(duration) => {
                self.observer.on_event(&MigrationEvent::Completed {
                    id,
                    direction,
                    duration,
                });
                Ok(())
            }
            Err(cause) => {
                self.observer.on_event(&MigrationEvent::Failed {
                    id,
                    direction,
                    error: &cause,
                });
                Err(MigrationError::Execution {
                    id: id.to_string(),
                    direction,
                    completed,
                    cause,
                })
            }
        }
    }

    /// Execute the action and the tracking write in one transaction
    ///
    /// Any early return drops `tx`, which rolls it back.
    fn execute_in_transaction(
        &mut self,
        migration: &Migration,
        direction: Direction,
    ) -> anyhow::Result<Duration> {
        let id = migration.id().as_str();
        let started = Instant::now();
        let tx = self.conn.transaction()?;

        migration.action(direction).execute(&tx)?;
        let duration = started.elapsed();

        match direction {
            Direction::Up => {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (id, applied_at, checksum, duration_ms) VALUES (?, ?, ?, ?)",
                        self.tracking_table
                    ),
                    params![
                        id,
                        Utc::now().timestamp_millis(),
                        migration.checksum(),
                        duration.as_millis() as i64,
                    ],
                )?;
            }
            Direction::Down => {
                let deleted = tx.execute(
                    &format!("DELETE FROM {} WHERE id = ?", self.tracking_table),
                    [id],
                )?;
                if deleted == 0 {
                    anyhow::bail!("no tracking entry for {} in {}", id, self.tracking_table);
                }
            }
        }

        tx.commit()?;
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn ids(migrations: &[&Migration]) -> Vec<String> {
        migrations.iter().map(|m| m.id().to_string()).collect()
    }

    fn three_tables() -> MigrationSet {
        MigrationSet::from_sql(&[
            ("1_a", "CREATE TABLE a (x INTEGER);", "DROP TABLE a;"),
            ("2_b", "CREATE TABLE b (x INTEGER);", "DROP TABLE b;"),
            ("3_c", "CREATE TABLE c (x INTEGER);", "DROP TABLE c;"),
        ])
        .unwrap()
    }

    fn tracked(service: &MigrationService<'_>) -> Vec<String> {
        service
            .get_applied()
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect()
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: RefCell<Vec<String>>,
    }

    impl MigrationObserver for RecordingObserver {
        fn on_event(&self, event: &MigrationEvent<'_>) {
            let label = match event {
                MigrationEvent::Started { id, direction } => format!("start {} {}", direction, id),
                MigrationEvent::Completed { id, direction, .. } => format!("done {} {}", direction, id),
                MigrationEvent::Failed { id, direction, .. } => format!("fail {} {}", direction, id),
            };
            self.events.borrow_mut().push(label);
        }
    }

    #[test]
    fn test_plan_pending_is_set_difference_sorted() {
        let set = three_tables();
        let applied: HashSet<MigrationId> = [MigrationId::parse("2_b").unwrap()].into_iter().collect();

        assert_eq!(ids(&plan_pending(set.as_slice(), &applied)), vec!["1_a", "3_c"]);

        let all: HashSet<MigrationId> = set.ids().cloned().collect();
        assert!(plan_pending(set.as_slice(), &all).is_empty());
        assert_eq!(plan_pending(set.as_slice(), &HashSet::new()).len(), 3);
    }

    #[test]
    fn test_plan_pending_sorts_unsorted_input() {
        let migrations = vec![
            Migration::sql("10_late", "", "").unwrap(),
            Migration::sql("9_early", "", "").unwrap(),
        ];
        assert_eq!(ids(&plan_pending(&migrations, &HashSet::new())), vec!["9_early", "10_late"]);
    }

    #[test]
    fn test_apply_then_revert_last() {
        let mut conn = Connection::open_in_memory().unwrap();
        let set = three_tables();
        let mut service = MigrationService::new(&mut conn);

        let report = service.run_pending(&set).unwrap();
        assert_eq!(report.migrations, vec!["1_a", "2_b", "3_c"]);
        assert_eq!(tracked(&service), vec!["1_a", "2_b", "3_c"]);
        assert!(service.get_pending(&set).unwrap().is_empty());

        let report = service.revert_last(&set).unwrap();
        assert_eq!(report.migrations, vec!["3_c"]);
        assert_eq!(report.untouched, 2);
        assert_eq!(tracked(&service), vec!["1_a", "2_b"]);
        assert!(!table_exists(service.conn, "c").unwrap());
        assert!(table_exists(service.conn, "b").unwrap());
    }

    #[test]
    fn test_failed_migration_halts_and_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        let set = MigrationSet::from_sql(&[
            ("1_a", "CREATE TABLE a (x INTEGER);", "DROP TABLE a;"),
            ("2_b", "CREATE TABLE b (x INTEGER); INSERT INTO missing VALUES (1);", "DROP TABLE b;"),
            ("3_c", "CREATE TABLE c (x INTEGER);", "DROP TABLE c;"),
        ])
        .unwrap();
        let mut service = MigrationService::new(&mut conn);

        let err = service.run_pending(&set).unwrap_err();
        match &err {
            MigrationError::Execution { id, direction, completed, .. } => {
                assert_eq!(id, "2_b");
                assert_eq!(*direction, Direction::Up);
                assert_eq!(*completed, 1);
            }
            other => panic!("expected execution error, got {:?}", other),
        }

        assert_eq!(tracked(&service), vec!["1_a"]);
        // The CREATE TABLE in the failing batch was rolled back with it
        assert!(!table_exists(service.conn, "b").unwrap());
        assert!(!table_exists(service.conn, "c").unwrap());
        assert_eq!(ids(&service.get_pending(&set).unwrap()), vec!["2_b", "3_c"]);
    }

    #[test]
    fn test_empty_pending_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut service = MigrationService::new(&mut conn);

        let report = service.apply_all(&[]).unwrap();
        assert!(report.is_empty());
        // No pending work means no bookkeeping either
        assert!(!table_exists(service.conn, DEFAULT_TRACKING_TABLE).unwrap());

        let status = service.status(&MigrationSet::default()).unwrap();
        assert!(status.applied.is_empty());
        assert!(status.pending.is_empty());
    }

    #[test]
    fn test_revert_with_nothing_applied_is_sequence_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        let set = three_tables();
        let mut service = MigrationService::new(&mut conn);

        assert!(matches!(service.revert_last(&set), Err(MigrationError::Sequence(_))));
        assert!(matches!(service.revert_all(&set), Err(MigrationError::Sequence(_))));
    }

    #[test]
    fn test_revert_all_newest_first() {
        let mut conn = Connection::open_in_memory().unwrap();
        let set = three_tables();
        let observer = RecordingObserver::default();
        let mut service = MigrationService::new(&mut conn).with_observer(&observer);

        service.run_pending(&set).unwrap();
        let report = service.revert_all(&set).unwrap();

        assert_eq!(report.migrations, vec!["3_c", "2_b", "1_a"]);
        assert!(tracked(&service).is_empty());
        let events = observer.events.borrow();
        assert_eq!(events[6], "start down 3_c");
        assert_eq!(events.last().unwrap(), "done down 1_a");
    }

    #[test]
    fn test_revert_failure_keeps_entry() {
        let mut conn = Connection::open_in_memory().unwrap();
        let set = MigrationSet::from_sql(&[
            ("1_a", "CREATE TABLE a (x INTEGER);", "DROP TABLE a;"),
            ("2_b", "CREATE TABLE b (x INTEGER);", "DROP TABLE does_not_exist;"),
        ])
        .unwrap();
        let mut service = MigrationService::new(&mut conn);
        service.run_pending(&set).unwrap();

        let err = service.revert_all(&set).unwrap_err();
        assert_eq!(err.migration_id(), Some("2_b"));
        assert_eq!(tracked(&service), vec!["1_a", "2_b"]);
        assert!(table_exists(service.conn, "a").unwrap());
    }

    #[test]
    fn test_revert_unknown_migration_is_configuration_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut service = MigrationService::new(&mut conn);
        service.run_pending(&three_tables()).unwrap();

        let shrunk = MigrationSet::from_sql(&[("1_a", "", ""), ("2_b", "", "")]).unwrap();
        let err = service.revert_all(&shrunk).unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(_)));
        // Checked before any revert ran
        assert_eq!(tracked(&service).len(), 3);
    }

    #[test]
    fn test_out_of_order_pending_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let original = MigrationSet::from_sql(&[("1_a", "", ""), ("3_c", "", "")]).unwrap();
        let extended = MigrationSet::from_sql(&[("1_a", "", ""), ("2_b", "", ""), ("3_c", "", "")]).unwrap();

        {
            let mut service = MigrationService::new(&mut conn);
            service.run_pending(&original).unwrap();
            let err = service.run_pending(&extended).unwrap_err();
            assert!(matches!(err, MigrationError::Sequence(_)));
            assert!(err.to_string().contains("2_b"));
        }

        let mut service = MigrationService::new(&mut conn).allow_out_of_order(true);
        let report = service.run_pending(&extended).unwrap();
        assert_eq!(report.migrations, vec!["2_b"]);
    }

    #[test]
    fn test_status_reports_unknown_and_modified() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut service = MigrationService::new(&mut conn);
        service.run_pending(&three_tables()).unwrap();

        let edited = MigrationSet::from_sql(&[
            ("1_a", "CREATE TABLE a (x BIGINT);", "DROP TABLE a;"),
            ("2_b", "CREATE TABLE b (x INTEGER);", "DROP TABLE b;"),
            ("4_d", "CREATE TABLE d (x INTEGER);", "DROP TABLE d;"),
        ])
        .unwrap();

        let status = service.status(&edited).unwrap();
        assert_eq!(status.applied.len(), 3);
        assert_eq!(status.pending, vec![MigrationId::parse("4_d").unwrap()]);
        assert_eq!(status.unknown, vec![MigrationId::parse("3_c").unwrap()]);
        assert_eq!(status.modified, vec![MigrationId::parse("1_a").unwrap()]);
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_custom_tracking_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(MigrationService::new(&mut conn).with_tracking_table("bad name; DROP").is_err());

        let mut service = MigrationService::new(&mut conn)
            .with_tracking_table("app_migrations")
            .unwrap();
        service.run_pending(&three_tables()).unwrap();
        assert!(table_exists(service.conn, "app_migrations").unwrap());
        assert!(!table_exists(service.conn, DEFAULT_TRACKING_TABLE).unwrap());
    }

    #[test]
    fn test_code_action_runs_in_transaction() {
        use crate::domain::Action;

        let mut conn = Connection::open_in_memory().unwrap();
        let set = MigrationSet::new(vec![
            Migration::sql("1_vendors", "CREATE TABLE vendors (id INTEGER, name VARCHAR);", "DROP TABLE vendors;").unwrap(),
            Migration::new(
                "2_seed_vendors",
                Action::code(|conn| {
                    conn.execute("INSERT INTO vendors VALUES (1, 'acme')", [])?;
                    anyhow::bail!("seed source unavailable")
                }),
                Action::sql("DELETE FROM vendors;"),
            )
            .unwrap(),
        ])
        .unwrap();

        let mut service = MigrationService::new(&mut conn);
        let err = service.run_pending(&set).unwrap_err();
        assert!(err.to_string().contains("seed source unavailable"));

        let count: i64 = service
            .conn
            .query_row("SELECT COUNT(*) FROM vendors", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
