//! Doctor service - tracking table health checks

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use crate::domain::result::Result;
use crate::domain::MigrationSet;
use crate::services::migration::MigrationStatus;

/// Doctor service for health checks
///
/// Works from a `MigrationStatus` snapshot, so it never touches the
/// database itself.
pub struct DoctorService<'a> {
    set: &'a MigrationSet,
}

impl<'a> DoctorService<'a> {
    pub fn new(set: &'a MigrationSet) -> Self {
        Self { set }
    }

    /// Run all health checks
    pub fn run_checks(&self, status: &MigrationStatus, tracking_table_exists: bool) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();

        checks.insert(
            "tracking_table".to_string(),
            if tracking_table_exists {
                CheckResult::pass(format!("Tracking table {} exists", status.tracking_table))
            } else if self.set.is_empty() {
                CheckResult::pass("No migrations defined yet")
            } else {
                CheckResult::warning(
                    format!("Tracking table {} not created; no migration has run", status.tracking_table),
                    None,
                )
            },
        );

        // Applied in the database but gone from the definitions
        checks.insert(
            "unknown_migrations".to_string(),
            if status.unknown.is_empty() {
                CheckResult::pass("Every applied migration is defined")
            } else {
                CheckResult::error(
                    format!(
                        "{} applied migration(s) have no definition and cannot be reverted",
                        status.unknown.len()
                    ),
                    Some(status.unknown.iter().map(|id| json!({"migration_id": id})).collect()),
                )
            },
        );

        // Definitions edited after they were applied
        checks.insert(
            "checksum_drift".to_string(),
            if status.modified.is_empty() {
                CheckResult::pass("Applied migrations match their definitions")
            } else {
                CheckResult::warning(
                    format!("{} applied migration(s) were edited after running", status.modified.len()),
                    Some(status.modified.iter().map(|id| json!({"migration_id": id})).collect()),
                )
            },
        );

        // Pending migrations that sort before the newest applied one
        let newest_applied = status.applied.iter().map(|a| &a.id).max();
        let gaps: Vec<_> = match newest_applied {
            Some(newest) => status.pending.iter().filter(|id| *id < newest).collect(),
            None => Vec::new(),
        };
        checks.insert(
            "ordering".to_string(),
            if gaps.is_empty() {
                CheckResult::pass("Applied migrations form a prefix of the definitions")
            } else {
                CheckResult::error(
                    format!("{} pending migration(s) are older than the newest applied one", gaps.len()),
                    Some(gaps.iter().map(|id| json!({"migration_id": id})).collect()),
                )
            },
        );

        checks.insert(
            "pending".to_string(),
            if status.pending.is_empty() {
                CheckResult::pass("Database is up to date")
            } else {
                CheckResult::warning(
                    format!("{} migration(s) pending", status.pending.len()),
                    None,
                )
            },
        );

        let passed = checks.values().filter(|c| c.status == "pass").count();
        let warnings = checks.values().filter(|c| c.status == "warning").count();
        let errors = checks.values().filter(|c| c.status == "error").count();

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary { passed, warnings, errors },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warning(message: impl Into<String>, details: Option<Vec<serde_json::Value>>) -> Self {
        Self {
            status: "warning".to_string(),
            message: message.into(),
            details,
        }
    }

    fn error(message: impl Into<String>, details: Option<Vec<serde_json::Value>>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: usize,
    pub warnings: usize,
    pub errors: usize,
}
