//! Tracking table entries

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::migration::MigrationId;

/// A migration recorded as applied in the tracking table
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub id: MigrationId,
    pub applied_at: DateTime<Utc>,
    /// Checksum of the SQL at the time it was applied
    pub checksum: Option<String>,
    pub duration_ms: i64,
}
