//! Validated, ordered collection of migrations

use std::collections::HashSet;
use std::path::Path;

use super::migration::{Migration, MigrationId};
use super::result::{MigrationError, Result};

/// All migrations known to a project, sorted ascending by id
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Build a set, rejecting duplicate ids
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(migration.id().as_str()) {
                return Err(MigrationError::configuration(format!(
                    "Duplicate migration id '{}'",
                    migration.id()
                )));
            }
        }

        migrations.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(Self { migrations })
    }

    /// Build a set from `(id, up_sql, down_sql)` tuples
    pub fn from_sql(entries: &[(&str, &str, &str)]) -> Result<Self> {
        let migrations = entries
            .iter()
            .map(|(id, up, down)| Migration::sql(id, *up, *down))
            .collect::<Result<Vec<_>>>()?;
        Self::new(migrations)
    }

    /// Load `<id>.up.sql` / `<id>.down.sql` pairs, validating their SQL
    pub fn from_dir(dir: &Path) -> Result<Self> {
        crate::adapters::filesystem::load_migrations(dir, true)
    }

    pub fn get(&self, id: &MigrationId) -> Option<&Migration> {
        self.migrations
            .binary_search_by(|m| m.id().cmp(id))
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    pub fn contains(&self, id: &MigrationId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MigrationId> {
        self.migrations.iter().map(|m| m.id())
    }

    pub fn as_slice(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
