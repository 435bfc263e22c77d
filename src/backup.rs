//! Store backups and guarded destructive operations.
//!
//! Backups are written with `VACUUM INTO`, producing a consistent single-file
//! copy even while the store is in WAL mode. [`guarded`] takes a backup,
//! runs an operation, and restores the backup if the operation fails.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use economy_harness_core::Error;

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

fn backup_prefix(config: &Config) -> String {
    let stem = config
        .db
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "economy".to_string());
    format!("{}_backup_", stem)
}

/// Write a timestamped copy of the store into the backup directory.
pub async fn create_backup(config: &Config) -> Result<PathBuf> {
    let dir = config.backup_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create backup directory: {}", dir.display()))?;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("{}{}.sqlite", backup_prefix(config), stamp));

    let pool = db::connect(config).await?;
    let result = sqlx::query("VACUUM INTO ?")
        .bind(path.to_string_lossy().into_owned())
        .execute(&pool)
        .await;
    pool.close().await;
    result.with_context(|| format!("Failed to write backup: {}", path.display()))?;

    tracing::info!(path = %path.display(), "backup created");
    Ok(path)
}

/// Backups in the backup directory, newest first.
pub fn list_backups(config: &Config) -> Result<Vec<BackupInfo>> {
    let dir = config.backup_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let prefix = backup_prefix(config);
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".sqlite") {
            continue;
        }
        let meta = entry.metadata()?;
        out.push(BackupInfo {
            path: entry.path(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    // Names embed the timestamp, so they break mtime ties.
    out.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    Ok(out)
}

pub fn latest_backup(config: &Config) -> Result<Option<PathBuf>> {
    Ok(list_backups(config)?.into_iter().next().map(|b| b.path))
}

fn sidecar_paths(db_path: &Path) -> [PathBuf; 2] {
    let base = db_path.to_string_lossy();
    [
        PathBuf::from(format!("{}-wal", base)),
        PathBuf::from(format!("{}-shm", base)),
    ]
}

/// Replace the store with `backup`.
///
/// The current store is first copied aside; if the copy-in fails, that copy
/// is put back. All pools on the store must be closed before calling this.
pub fn restore_backup(config: &Config, backup: &Path) -> Result<()> {
    if !backup.is_file() {
        return Err(Error::not_found(format!("backup {}", backup.display())).into());
    }
    let db_path = &config.db.path;
    let aside = db_path.with_extension("restore-tmp");

    let had_store = db_path.exists();
    if had_store {
        std::fs::copy(db_path, &aside)
            .with_context(|| format!("Failed to copy current store to {}", aside.display()))?;
    }

    let result = (|| -> Result<()> {
        for sidecar in sidecar_paths(db_path) {
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
            }
        }
        if had_store {
            std::fs::remove_file(db_path)?;
        }
        std::fs::copy(backup, db_path)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            if had_store {
                let _ = std::fs::remove_file(&aside);
            }
            tracing::info!(backup = %backup.display(), "store restored");
            Ok(())
        }
        Err(e) if had_store => match std::fs::copy(&aside, db_path) {
            Ok(_) => {
                let _ = std::fs::remove_file(&aside);
                Err(e.context(format!("Failed to restore {}", backup.display())))
            }
            Err(put_back) => Err(Error::RollbackFailed {
                original: format!("{:#}", e),
                rollback: format!(
                    "could not put {} back: {}",
                    aside.display(),
                    put_back
                ),
            }
            .into()),
        },
        Err(e) => Err(e.context(format!("Failed to restore {}", backup.display()))),
    }
}

/// Run a destructive operation behind a fresh backup.
///
/// On failure the backup is restored and the original error returned; if
/// the restore fails too, the result is [`Error::RollbackFailed`]. The
/// operation must close any pool it opens before returning.
pub async fn guarded<T, F, Fut>(config: &Config, label: &str, op: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let backup = create_backup(config)
        .await
        .with_context(|| format!("{}: safety backup failed", label))?;

    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(operation = label, error = %format!("{:#}", e), "rolling back");
            match restore_backup(config, &backup) {
                Ok(()) => Err(e.context(format!(
                    "{} failed; store restored from {}",
                    label,
                    backup.display()
                ))),
                Err(rollback) => Err(Error::RollbackFailed {
                    original: format!("{:#}", e),
                    rollback: format!("{:#}", rollback),
                }
                .into()),
            }
        }
    }
}

pub async fn run_backup_create(config: &Config) -> Result<()> {
    let path = create_backup(config).await?;
    println!("backup written: {}", path.display());
    Ok(())
}

pub fn run_backup_list(config: &Config) -> Result<()> {
    let backups = list_backups(config)?;
    if backups.is_empty() {
        println!("No backups in {}.", config.backup_dir().display());
        return Ok(());
    }
    println!("{:<64} {:>10}", "BACKUP", "SIZE");
    for b in &backups {
        println!("{:<64} {:>10}", b.path.display(), b.size);
    }
    Ok(())
}

pub fn run_backup_restore(config: &Config, path: Option<&Path>) -> Result<()> {
    let backup = match path {
        Some(p) => p.to_path_buf(),
        None => latest_backup(config)?
            .ok_or_else(|| Error::not_found(format!("backups in {}", config.backup_dir().display())))?,
    };
    restore_backup(config, &backup)?;
    println!("restored: {}", backup.display());
    println!("ok");
    Ok(())
}
