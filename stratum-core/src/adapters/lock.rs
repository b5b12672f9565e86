//! Advisory file lock serializing runner instances against one database

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::domain::result::{MigrationError, Result};

/// Exclusive lock on `<database>.lock`, released on drop
#[derive(Debug)]
pub struct MigrationLock {
    file: File,
    path: PathBuf,
}

impl MigrationLock {
    /// Lock file path for a database file
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock without waiting
    ///
    /// Fails with a connection error if another runner holds it.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = Self::path_for(db_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive().map_err(|e| {
            MigrationError::connection(format!(
                "Another migration run holds {} ({})",
                path.display(),
                e
            ))
        })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_path() {
        let path = MigrationLock::path_for(Path::new("/tmp/app.duckdb"));
        assert_eq!(path, PathBuf::from("/tmp/app.duckdb.lock"));
    }

    #[test]
    fn test_second_lock_fails_until_released() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("app.duckdb");

        let first = MigrationLock::acquire(&db_path).unwrap();
        let err = MigrationLock::acquire(&db_path).unwrap_err();
        assert!(matches!(err, MigrationError::Connection(_)));

        drop(first);
        let again = MigrationLock::acquire(&db_path).unwrap();
        assert!(again.path().exists());
    }
}
