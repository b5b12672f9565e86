//! Integration tests for stratum-core
//!
//! These run the migration engine against real DuckDB files in temporary
//! directories, reopening the database between steps the way separate CLI
//! invocations do.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use stratum_core::adapters::duckdb::DuckDbDatabase;
use stratum_core::config::{Config, SETTINGS_FILE};
use stratum_core::ports::NoopObserver;
use stratum_core::{
    plan_pending, Direction, LoggingService, MigrationError, MigrationId, MigrationSet,
    StratumContext,
};

// ============================================================================
// Test Helpers
// ============================================================================

const VENDORS_UP: &str = "CREATE TABLE vendors (id INTEGER PRIMARY KEY, name VARCHAR NOT NULL);";
const VENDORS_DOWN: &str = "DROP TABLE vendors;";
const IMAGES_UP: &str = "CREATE TABLE vendor_images (id INTEGER, vendor_id INTEGER, url VARCHAR);";
const IMAGES_DOWN: &str = "DROP TABLE vendor_images;";
const ALT_UP: &str = "ALTER TABLE vendor_images ADD COLUMN alt_text VARCHAR;";
const ALT_DOWN: &str = "ALTER TABLE vendor_images DROP COLUMN alt_text;";

/// Three migrations A, B, C
fn vendor_set() -> MigrationSet {
    MigrationSet::from_sql(&[
        ("20240101000000_create_vendors", VENDORS_UP, VENDORS_DOWN),
        ("20240102000000_create_vendor_images", IMAGES_UP, IMAGES_DOWN),
        ("20240103000000_add_alt_text", ALT_UP, ALT_DOWN),
    ])
    .unwrap()
}

fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("app.duckdb")
}

/// Open the database, run `f` against a default runner, close it again
fn with_runner<T>(
    path: &Path,
    f: impl FnOnce(&mut stratum_core::MigrationService<'_>) -> T,
) -> T {
    let mut db = DuckDbDatabase::open(path).expect("Failed to open database");
    let mut service = db.migration_service();
    f(&mut service)
}

fn applied_ids(path: &Path) -> Vec<String> {
    with_runner(path, |service| {
        service
            .get_applied()
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect()
    })
}

fn table_exists(path: &Path, table: &str) -> bool {
    let db = DuckDbDatabase::open(path).unwrap();
    db.table_exists(table).unwrap()
}

fn write_migration(dir: &Path, id: &str, up: &str, down: &str) {
    fs::write(dir.join(format!("{}.up.sql", id)), up).unwrap();
    fs::write(dir.join(format!("{}.down.sql", id)), down).unwrap();
}

// ============================================================================
// Apply / Revert Scenarios
// ============================================================================

#[test]
fn test_apply_all_then_revert_last() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = vendor_set();

    let report = with_runner(&path, |s| s.run_pending(&set)).unwrap();
    assert_eq!(report.migrations.len(), 3);
    assert_eq!(
        applied_ids(&path),
        vec![
            "20240101000000_create_vendors",
            "20240102000000_create_vendor_images",
            "20240103000000_add_alt_text",
        ]
    );

    let report = with_runner(&path, |s| s.revert_last(&set)).unwrap();
    assert_eq!(report.direction, Direction::Down);
    assert_eq!(report.migrations, vec!["20240103000000_add_alt_text"]);
    assert_eq!(report.untouched, 2);
    assert_eq!(
        applied_ids(&path),
        vec!["20240101000000_create_vendors", "20240102000000_create_vendor_images"]
    );

    // The reverted column is gone, the table is not
    let db = DuckDbDatabase::open(&path).unwrap();
    let columns: i64 = db
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM information_schema.columns
             WHERE table_name = 'vendor_images' AND column_name = 'alt_text'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(columns, 0);
}

#[test]
fn test_second_plan_is_empty_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = vendor_set();

    with_runner(&path, |s| s.run_pending(&set)).unwrap();

    let pending = with_runner(&path, |s| {
        s.get_pending(&set)
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect::<Vec<_>>()
    });
    assert!(pending.is_empty());

    let report = with_runner(&path, |s| s.run_pending(&set)).unwrap();
    assert!(report.is_empty());
    assert_eq!(report.untouched, 3);
}

#[test]
fn test_revert_then_apply_restores_tracking_table() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = vendor_set();

    with_runner(&path, |s| s.run_pending(&set)).unwrap();
    let before = applied_ids(&path);

    with_runner(&path, |s| s.revert_last(&set)).unwrap();
    let report = with_runner(&path, |s| s.run_pending(&set)).unwrap();

    assert_eq!(report.migrations, vec!["20240103000000_add_alt_text"]);
    assert_eq!(applied_ids(&path), before);
}

#[test]
fn test_failure_keeps_earlier_migrations() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = MigrationSet::from_sql(&[
        ("20240101000000_create_vendors", VENDORS_UP, VENDORS_DOWN),
        (
            "20240102000000_broken_images",
            "CREATE TABLE vendor_images (id INTEGER); INSERT INTO missing_table VALUES (1);",
            IMAGES_DOWN,
        ),
    ])
    .unwrap();

    let err = with_runner(&path, |s| s.run_pending(&set)).unwrap_err();
    match &err {
        MigrationError::Execution {
            id,
            direction,
            completed,
            ..
        } => {
            assert_eq!(id, "20240102000000_broken_images");
            assert_eq!(*direction, Direction::Up);
            assert_eq!(*completed, 1);
        }
        other => panic!("Expected execution error, got {:?}", other),
    }
    assert_eq!(err.migration_id(), Some("20240102000000_broken_images"));

    // A committed, B rolled back including its first statement
    assert_eq!(applied_ids(&path), vec!["20240101000000_create_vendors"]);
    assert!(table_exists(&path, "vendors"));
    assert!(!table_exists(&path, "vendor_images"));

    let pending: Vec<String> = with_runner(&path, |s| {
        s.get_pending(&set)
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    });
    assert_eq!(pending, vec!["20240102000000_broken_images"]);
}

#[test]
fn test_nothing_defined_nothing_applied() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = MigrationSet::default();

    let report = with_runner(&path, |s| s.run_pending(&set)).unwrap();
    assert!(report.is_empty());

    let status = with_runner(&path, |s| s.status(&set)).unwrap();
    assert!(status.applied.is_empty());
    assert!(status.pending.is_empty());

    // An empty run does not create the tracking table
    assert!(!table_exists(&path, "schema_migrations"));
}

#[test]
fn test_revert_all_empties_tracking_table() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = vendor_set();

    with_runner(&path, |s| s.run_pending(&set)).unwrap();
    let report = with_runner(&path, |s| s.revert_all(&set)).unwrap();

    assert_eq!(
        report.migrations,
        vec![
            "20240103000000_add_alt_text",
            "20240102000000_create_vendor_images",
            "20240101000000_create_vendors",
        ]
    );
    assert!(applied_ids(&path).is_empty());
    assert!(!table_exists(&path, "vendors"));

    let err = with_runner(&path, |s| s.revert_last(&set)).unwrap_err();
    assert!(matches!(err, MigrationError::Sequence(_)));
}

#[test]
fn test_plan_pending_matches_set_difference() {
    let set = vendor_set();
    let applied: HashSet<MigrationId> = [MigrationId::parse("20240102000000_create_vendor_images").unwrap()]
        .into_iter()
        .collect();

    let pending: Vec<String> = plan_pending(set.as_slice(), &applied)
        .iter()
        .map(|m| m.id().to_string())
        .collect();
    assert_eq!(
        pending,
        vec!["20240101000000_create_vendors", "20240103000000_add_alt_text"]
    );

    let everything: HashSet<MigrationId> = set.ids().cloned().collect();
    assert!(plan_pending(set.as_slice(), &everything).is_empty());
}

#[test]
fn test_tracking_row_records_checksum_and_time() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    let set = vendor_set();
    let before = chrono::Utc::now() - chrono::Duration::seconds(1);

    with_runner(&path, |s| s.run_pending(&set)).unwrap();

    let applied = with_runner(&path, |s| s.get_applied()).unwrap();
    let first = &applied[0];
    let definition = set.get(&first.id).unwrap();
    assert_eq!(first.checksum, definition.checksum());
    assert!(first.applied_at >= before);
    assert!(first.duration_ms >= 0);
}

// ============================================================================
// Directory Loading
// ============================================================================

#[test]
fn test_context_runs_migrations_from_directory() {
    let temp_dir = TempDir::new().unwrap();
    let migrations_dir = temp_dir.path().join("migrations");
    fs::create_dir_all(&migrations_dir).unwrap();
    write_migration(&migrations_dir, "20240101000000_create_vendors", VENDORS_UP, VENDORS_DOWN);
    write_migration(&migrations_dir, "20240102000000_create_vendor_images", IMAGES_UP, IMAGES_DOWN);

    fs::write(
        temp_dir.path().join(SETTINGS_FILE),
        r#"{"database": "shop.duckdb", "trackingTable": "shop_migrations"}"#,
    )
    .unwrap();
    let config = Config::load(temp_dir.path()).unwrap();

    let mut ctx = StratumContext::new(temp_dir.path(), config).unwrap();
    let report = ctx.up(&NoopObserver).unwrap();
    assert_eq!(report.migrations.len(), 2);

    let status = ctx.status().unwrap();
    assert_eq!(status.tracking_table, "shop_migrations");
    assert!(status.is_up_to_date());
    assert!(ctx.database.table_exists("shop_migrations").unwrap());
    assert!(!ctx.database.table_exists("schema_migrations").unwrap());

    // A new file shows up as pending on the next run
    write_migration(&migrations_dir, "20240103000000_add_alt_text", ALT_UP, ALT_DOWN);
    drop(ctx);
    let config = Config::load(temp_dir.path()).unwrap();
    let mut ctx = StratumContext::new(temp_dir.path(), config).unwrap();
    let status = ctx.status().unwrap();
    assert_eq!(status.pending.len(), 1);

    let doctor = ctx.doctor().unwrap();
    assert_eq!(doctor.summary.errors, 0);
    assert_eq!(doctor.checks["pending"].status, "warning");
}

#[test]
fn test_edited_migration_reported_as_modified() {
    let temp_dir = TempDir::new().unwrap();
    let migrations_dir = temp_dir.path().join("migrations");
    fs::create_dir_all(&migrations_dir).unwrap();
    write_migration(&migrations_dir, "20240101000000_create_vendors", VENDORS_UP, VENDORS_DOWN);

    let mut ctx = StratumContext::new(temp_dir.path(), Config::load(temp_dir.path()).unwrap()).unwrap();
    ctx.up(&NoopObserver).unwrap();
    drop(ctx);

    write_migration(
        &migrations_dir,
        "20240101000000_create_vendors",
        "CREATE TABLE vendors (id INTEGER PRIMARY KEY, name VARCHAR NOT NULL, slug VARCHAR);",
        VENDORS_DOWN,
    );

    let mut ctx = StratumContext::new(temp_dir.path(), Config::load(temp_dir.path()).unwrap()).unwrap();
    let status = ctx.status().unwrap();
    assert_eq!(status.modified.len(), 1);
    assert!(status.pending.is_empty());

    let doctor = ctx.doctor().unwrap();
    assert_eq!(doctor.checks["checksum_drift"].status, "warning");
}

#[test]
fn test_invalid_sql_file_rejected_before_running() {
    let temp_dir = TempDir::new().unwrap();
    let migrations_dir = temp_dir.path().join("migrations");
    fs::create_dir_all(&migrations_dir).unwrap();
    write_migration(&migrations_dir, "20240101000000_create_vendors", VENDORS_UP, VENDORS_DOWN);
    write_migration(&migrations_dir, "20240102000000_typo", "CREAT TABLE oops (id INTEGER);", "");

    let config = Config::load(temp_dir.path()).unwrap();
    let database = config.database.clone();
    let err = StratumContext::new(temp_dir.path(), config).err().unwrap();
    assert!(matches!(err, MigrationError::Configuration(_)));

    // Nothing ran, not even the valid first migration
    assert!(!database.exists() || applied_ids(&database).is_empty());
}

#[test]
fn test_vendor_images_demo_loads() {
    let demo_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/vendor_images");
    let set = MigrationSet::from_dir(&demo_dir).unwrap();

    let ids: Vec<String> = set.ids().map(|id| id.to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "20240105090000_create_vendors",
            "20240110083000_drop_legacy_vendor_photos",
            "20240112101500_drop_vendor_slug_index",
            "20240118140000_create_vendor_images",
            "20240125091500_add_vendor_image_metadata",
        ]
    );
    assert!(set.iter().all(|m| m.checksum().is_some()));
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn test_logging_service_records_runner_events() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join("state");
    fs::create_dir_all(&state_dir).unwrap();
    let path = db_path(&temp_dir);

    let logger = LoggingService::new(&state_dir, "test").unwrap().for_database(&path);
    let set = MigrationSet::from_sql(&[
        ("20240101000000_create_vendors", VENDORS_UP, VENDORS_DOWN),
        ("20240102000000_broken", "SELECT * FROM nowhere;", ""),
    ])
    .unwrap();

    let mut db = DuckDbDatabase::open(&path).unwrap();
    let err = db
        .migration_service()
        .with_observer(&logger)
        .run_pending(&set)
        .unwrap_err();
    assert_eq!(err.migration_id(), Some("20240102000000_broken"));

    let applied = logger.get_for_migration("20240101000000_create_vendors", 10).unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].event, "migration_applied");
    assert_eq!(applied[0].direction.as_deref(), Some("up"));
    assert_eq!(applied[0].database_path.as_deref(), Some(path.display().to_string().as_str()));

    let errors = logger.get_errors(10).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event, "migration_failed");
    assert_eq!(errors[0].migration_id.as_deref(), Some("20240102000000_broken"));
    assert!(errors[0].error_message.is_some());
}
