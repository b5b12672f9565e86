//! Backup service - safety copies of the target database
//!
//! Creates ZIP archives holding the database file before a migration run
//! mutates it, so a botched migration can be rolled back by hand.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::domain::BackupMetadata;

const BACKUP_PREFIX: &str = "stratum-";

/// Backup service for the database being migrated
pub struct BackupService {
    backups_dir: PathBuf,
    db_path: PathBuf,
}

impl BackupService {
    pub fn new(state_dir: &Path, db_path: &Path) -> Self {
        Self {
            backups_dir: state_dir.join("backups"),
            db_path: db_path.to_path_buf(),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    fn db_entry_name(&self) -> String {
        self.db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database.duckdb".to_string())
    }

    /// Archive the database file
    ///
    /// Returns `None` when the database does not exist yet; there is
    /// nothing to protect before the first migration creates it.
    pub fn create(&self, max_backups: Option<usize>) -> Result<Option<BackupMetadata>> {
        if !self.db_path.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.backups_dir)?;

        let now = Utc::now();
        let timestamp = now.format("%Y-%m-%dT%H-%M-%S");
        let micros = now.timestamp_subsec_micros();
        let backup_name = format!("{}{}-{:06}.zip", BACKUP_PREFIX, timestamp, micros);
        let backup_path = self.backups_dir.join(&backup_name);

        let file = File::create(&backup_path).context("Failed to create backup file")?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(self.db_entry_name(), options)?;
        let mut db_file = File::open(&self.db_path)
            .with_context(|| format!("Failed to read {}", self.db_path.display()))?;
        let mut buffer = Vec::new();
        db_file.read_to_end(&mut buffer)?;
        zip.write_all(&buffer)?;
        zip.finish()?;

        let size_bytes = fs::metadata(&backup_path)?.len();

        if let Some(max) = max_backups {
            self.apply_retention(max)?;
        }

        Ok(Some(BackupMetadata::new(backup_name, now, size_bytes)))
    }

    /// List all backups, newest first
    pub fn list(&self) -> Result<Vec<BackupMetadata>> {
        if !self.backups_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backups_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }

            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();
            if !name.starts_with(BACKUP_PREFIX) {
                continue;
            }

            let size_bytes = fs::metadata(&path)?.len();
            let created_at = parse_backup_time(&name);
            backups.push(BackupMetadata::new(name, created_at, size_bytes));
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Restore the database file from a backup
    ///
    /// The caller must make sure nothing holds the database open.
    pub fn restore(&self, backup_name: &str) -> Result<()> {
        let backup_path = self.backups_dir.join(backup_name);
        if !backup_path.exists() {
            anyhow::bail!("Backup not found: {}", backup_name);
        }

        let file = File::open(&backup_path)?;
        let mut archive = ZipArchive::new(file)?;
        if archive.len() != 1 {
            anyhow::bail!("Backup {} does not contain exactly one database file", backup_name);
        }

        let mut entry = archive.by_index(0)?;
        let mut outfile = File::create(&self.db_path)
            .with_context(|| format!("Failed to write {}", self.db_path.display()))?;
        std::io::copy(&mut entry, &mut outfile)?;

        // DuckDB's WAL belongs to the replaced file
        let wal_path = PathBuf::from(format!("{}.wal", self.db_path.display()));
        if wal_path.exists() {
            fs::remove_file(&wal_path)?;
        }

        Ok(())
    }

    /// Delete all backups
    pub fn clear(&self) -> Result<ClearResult> {
        let backups = self.list()?;
        for backup in &backups {
            fs::remove_file(self.backups_dir.join(&backup.name))?;
        }
        Ok(ClearResult {
            deleted: backups.len(),
        })
    }

    fn apply_retention(&self, max_backups: usize) -> Result<()> {
        let mut backups = self.list()?;

        while backups.len() > max_backups {
            if let Some(oldest) = backups.pop() {
                fs::remove_file(self.backups_dir.join(&oldest.name))?;
            }
        }

        Ok(())
    }
}

/// Parse creation time from a "stratum-TIMESTAMP.zip" filename
fn parse_backup_time(backup_name: &str) -> chrono::DateTime<Utc> {
    let ts = backup_name
        .strip_prefix(BACKUP_PREFIX)
        .and_then(|s| s.strip_suffix(".zip"));

    ts.and_then(|ts| {
        chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H-%M-%S-%6f")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H-%M-%S"))
            .ok()
    })
    .map(|dt| dt.and_utc())
    .unwrap_or_else(Utc::now)
}

#[derive(Debug, Serialize)]
pub struct ClearResult {
    pub deleted: usize,
}
