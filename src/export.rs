//! Re-serialize stored records into mission XML files.
//!
//! Two groupings are supported:
//!
//! - **by source**: each record goes back to the `folder/file` it was
//!   extracted from;
//! - **by itemclass**: one `<itemclass>.xml` per itemclass in the export
//!   subfolder, unassigned records in the misc file, followed by a manifest
//!   sync so the game loads exactly the exported files.
//!
//! A file whose records cannot be loaded or written is reported and
//! skipped; other files are still written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use economy_harness_core::manifest::sync_manifest;
use economy_harness_core::reconstruct::{reconstruct, write_document};
use economy_harness_core::store::RecordStore;

use crate::config::Config;
use crate::db;
use crate::ingest::FileFailure;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default)]
pub struct ExportReport {
    pub files: Vec<(PathBuf, usize)>,
    pub failures: Vec<FileFailure>,
    pub manifest: Option<PathBuf>,
}

/// Make an itemclass name usable as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if "<>:\"/\\|?*".contains(c) { '_' } else { c })
        .collect();
    let mut out = replaced.trim_matches(|c| c == ' ' || c == '.').to_string();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    if out.is_empty() {
        "unnamed".to_string()
    } else {
        out
    }
}

/// Load, reconstruct, and write one output file.
async fn write_group(
    store: &SqliteStore,
    config: &Config,
    keys: &[String],
    path: &Path,
) -> Result<usize> {
    let conventions = config.conventions();
    let mut nodes = Vec::with_capacity(keys.len());
    for key in keys {
        let shape = store.load_record(key).await?;
        nodes.push(reconstruct(&shape, &config.records.tag, &conventions));
    }
    let text = write_document(&config.records.container, nodes, config.export.indent)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(keys.len())
}

async fn write_groups(
    store: &SqliteStore,
    config: &Config,
    groups: BTreeMap<PathBuf, Vec<String>>,
    report: &mut ExportReport,
) {
    for (path, keys) in groups {
        match write_group(store, config, &keys, &path).await {
            Ok(count) => {
                tracing::info!(path = %path.display(), records = count, "exported");
                report.files.push((path, count));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "export failed");
                report.failures.push(FileFailure {
                    path,
                    error: format!("{:#}", e),
                });
            }
        }
    }
}

/// Write every record back to `out_root/<folder>/<file>` of its source.
/// `out_root` defaults to the mission root.
pub async fn export_by_source(config: &Config, out_root: Option<&Path>) -> Result<ExportReport> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool, config.records.flags);
    let root = out_root.unwrap_or(config.mission.root.as_path());

    let mut groups: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for meta in store.list_records().await? {
        let path = root.join(&meta.source_folder).join(&meta.source_file);
        groups.entry(path).or_default().push(meta.key);
    }

    let mut report = ExportReport::default();
    write_groups(&store, config, groups, &mut report).await;
    store.close().await;
    Ok(report)
}

async fn itemclass_assignments(pool: &SqlitePool) -> Result<Vec<(String, Option<String>)>> {
    let rows = sqlx::query(
        r#"
        SELECT te.element_key, c.name AS itemclass
        FROM type_elements te
        LEFT JOIN element_itemclasses e ON e.element_key = te.element_key
        LEFT JOIN itemclasses c ON c.id = e.itemclass_id
        ORDER BY te.element_key
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("element_key"), row.get("itemclass")))
        .collect())
}

/// Write one file per itemclass into the export subfolder and point the
/// manifest at them.
pub async fn export_by_itemclass(config: &Config) -> Result<ExportReport> {
    let pool = db::connect(config).await?;
    let assignments = itemclass_assignments(&pool).await?;
    let store = SqliteStore::new(pool, config.records.flags);
    let dir = config.export_dir();

    let mut groups: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for (key, itemclass) in assignments {
        let file = match itemclass {
            Some(name) => format!("{}.xml", sanitize_filename(&name)),
            None => config.export.misc_file.clone(),
        };
        groups.entry(dir.join(file)).or_default().push(key);
    }

    let mut report = ExportReport::default();
    write_groups(&store, config, groups, &mut report).await;
    store.close().await;

    let written: Vec<String> = report
        .files
        .iter()
        .filter_map(|(p, _)| p.file_name().map(|f| f.to_string_lossy().into_owned()))
        .collect();
    let manifest_path = config.manifest_path();
    let existing = if manifest_path.exists() {
        Some(
            std::fs::read_to_string(&manifest_path)
                .with_context(|| format!("Failed to read {}", manifest_path.display()))?,
        )
    } else {
        None
    };
    let updated = sync_manifest(existing.as_deref(), &config.export.subfolder, &written);
    if existing.as_deref() != Some(updated.as_str()) {
        if let Some(parent) = manifest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&manifest_path, updated)
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    }
    report.manifest = Some(manifest_path);

    Ok(report)
}

pub async fn run_export(config: &Config, by_itemclass: bool, out_root: Option<&Path>) -> Result<()> {
    let report = if by_itemclass {
        export_by_itemclass(config).await?
    } else {
        export_by_source(config, out_root).await?
    };

    println!(
        "export {}",
        if by_itemclass { "by itemclass" } else { "by source" }
    );
    for (path, count) in &report.files {
        println!("  {} ({} records)", path.display(), count);
    }
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.error);
    }
    if let Some(manifest) = &report.manifest {
        println!("  manifest: {}", manifest.display());
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_itemclass_names() {
        assert_eq!(sanitize_filename("Weapons/Rifles"), "Weapons_Rifles");
        assert_eq!(sanitize_filename("a<>b"), "a_b");
        assert_eq!(sanitize_filename(" .hidden. "), "hidden");
        assert_eq!(sanitize_filename("???"), "_");
        assert_eq!(sanitize_filename(" . "), "unnamed");
    }
}
